//! 答复方：SummaryResponder 直接列出各步骤输出；LlmResponder 让 LLM 基于收集的数据回答原始问题

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, Message};
use crate::plan::Plan;
use crate::planner::Responder;

/// 答复 prompt 的固定开头（Mock 客户端据此区分规划与答复请求）
pub const RESPONDER_PROMPT_PREFIX: &str = "Original request:";

/// 收集结果的文本形式，按步骤顺序
pub fn render_results(plan: &Plan, results: &BTreeMap<String, Value>) -> String {
    plan.steps
        .iter()
        .filter_map(|step| {
            let key = step.result_key();
            results.get(&key).map(|value| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{} ({}): {}", key, step.tool_name, text)
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 不依赖 LLM 的汇总
#[derive(Debug, Default)]
pub struct SummaryResponder;

#[async_trait]
impl Responder for SummaryResponder {
    async fn respond(
        &self,
        _request: &str,
        plan: &Plan,
        results: &BTreeMap<String, Value>,
    ) -> Result<String, String> {
        let body = render_results(plan, results);
        if body.is_empty() {
            Ok(format!("Completed: {} (no step output)", plan.objective))
        } else {
            Ok(format!("Completed: {}\n{}", plan.objective, body))
        }
    }
}

pub struct LlmResponder {
    llm: Arc<dyn LlmClient>,
}

impl LlmResponder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn respond(
        &self,
        request: &str,
        plan: &Plan,
        results: &BTreeMap<String, Value>,
    ) -> Result<String, String> {
        let system = "You are a helpful assistant. Answer the user's question based ONLY on the \
                      collected data. If the data is empty or missing, say so.";
        let user = format!(
            "{} {}\n\nObjective: {}\n\nCollected data:\n{}",
            RESPONDER_PROMPT_PREFIX,
            request,
            plan.objective,
            render_results(plan, results)
        );
        self.llm
            .complete(&[Message::system(system), Message::user(user)])
            .await
    }
}
