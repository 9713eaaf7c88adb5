//! LLM 规划方：把工具目录和 Plan 的 JSON Schema 拼进 system prompt，调用 LLM 并解析计划

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::PlanningError;
use crate::llm::{LlmClient, Message};
use crate::plan::{Plan, Step};
use crate::planner::{parse_arguments, parse_plan, Planner};
use crate::tools::{plan_schema_json, ToolSpec};

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: "You are a data analysis agent. Answer the user's question by creating \
                            a step-by-step execution plan."
                .to_string(),
        }
    }

    fn build_system_prompt(&self, feedback: Option<&str>, tools: &[ToolSpec]) -> String {
        let mut prompt = format!(
            "{}\n\n\
             ### CONSTRAINTS\n\
             1. You can ONLY use the tools listed below.\n\
             2. Step ids start at 1 and increase by one.\n\
             3. To use the output of an earlier step, pass \"ref:step_N\" as the argument value.\n\
             4. Answer strictly in JSON.\n\n\
             ### AVAILABLE TOOLS\n{}\n",
            self.system_prompt,
            format_catalogue(tools)
        );
        if let Some(feedback) = feedback {
            prompt.push_str(&format!(
                "\nIMPORTANT: The user rejected your previous plan. Here is their feedback: '{feedback}'. \
                 You MUST adjust the plan to address this feedback.\n"
            ));
        }
        prompt.push_str(&format!(
            "\n### ANSWER FORMAT\nOutput valid JSON that matches the following JSON Schema:\n{}",
            plan_schema_json()
        ));
        prompt
    }
}

/// 工具目录转为 prompt 文本
pub fn format_catalogue(tools: &[ToolSpec]) -> String {
    tools
        .iter()
        .map(|tool| {
            let params = if tool.parameters.is_empty() {
                "None".to_string()
            } else {
                tool.parameters
                    .iter()
                    .map(|(name, desc)| format!("{name} ({desc})"))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let returns = if tool.returns.is_empty() {
                "scalar".to_string()
            } else {
                format!("records with columns [{}]", tool.returns.join(", "))
            };
            format!(
                "- Tool Name: {}\n  Description: {}\n  Parameters: {}\n  Returns: {}",
                tool.name, tool.description, params, returns
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        request: &str,
        feedback: Option<&str>,
        tools: &[ToolSpec],
    ) -> Result<Plan, PlanningError> {
        let messages = vec![
            Message::system(self.build_system_prompt(feedback, tools)),
            Message::user(request),
        ];
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(PlanningError::Collaborator)?;
        parse_plan(&reply)
    }

    async fn revise_step(
        &self,
        request: &str,
        step: &Step,
        error: &str,
        guidance: &str,
    ) -> Option<Map<String, Value>> {
        let system = format!(
            "You are a debugging assistant. The previous attempt to run '{}' failed.\n\n\
             PARAMETERS USED:\n{}\n\nERROR MESSAGE:\n{}\n\n\
             The user gave this guidance: '{}'.\n\
             Output ONLY a JSON object with the corrected arguments for the same tool.",
            step.tool_name,
            Value::Object(step.arguments.clone()),
            error,
            guidance
        );
        let messages = vec![Message::system(system), Message::user(request)];
        match self.llm.complete(&messages).await {
            Ok(reply) => {
                let revised = parse_arguments(&reply);
                if revised.is_none() {
                    tracing::warn!("Argument revision reply was not a JSON object, ignoring");
                }
                revised
            }
            Err(e) => {
                tracing::warn!("Argument revision failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// 记录收到的 system prompt，并返回固定回复
    struct RecordingLlm {
        reply: String,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(&self, messages: &[Message]) -> Result<String, String> {
            self.seen.lock().unwrap().push(messages[0].content.clone());
            Ok(self.reply.clone())
        }
    }

    fn catalogue() -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: "get_invoices".into(),
            description: "Invoices by customer".into(),
            parameters: BTreeMap::from([("Customer".into(), "Customer name".into())]),
            returns: vec!["Invoice_ID".into()],
        }]
    }

    #[tokio::test]
    async fn test_plan_includes_catalogue_and_feedback() {
        let llm = Arc::new(RecordingLlm {
            reply: r#"{"steps":[{"id":1,"tool_name":"get_invoices","arguments":{"Customer":"ACME"}}],"objective":"o"}"#.into(),
            seen: Mutex::new(Vec::new()),
        });
        let planner = LlmPlanner::new(llm.clone());
        let plan = planner
            .plan("invoices for ACME", Some("only 2024"), &catalogue())
            .await
            .unwrap();
        assert_eq!(plan.steps[0].tool_name, "get_invoices");

        let prompt = llm.seen.lock().unwrap()[0].clone();
        assert!(prompt.contains("Tool Name: get_invoices"));
        assert!(prompt.contains("Customer (Customer name)"));
        assert!(prompt.contains("only 2024"));
        assert!(prompt.contains("JSON Schema"));
    }

    #[tokio::test]
    async fn test_revise_step() {
        let llm = Arc::new(RecordingLlm {
            reply: r#"{"Customer": "Acme Corp"}"#.into(),
            seen: Mutex::new(Vec::new()),
        });
        let planner = LlmPlanner::new(llm);
        let step = Step::new(1, "get_invoices", Map::new());
        let revised = planner
            .revise_step("q", &step, "no such customer", "it's Acme Corp")
            .await
            .unwrap();
        assert_eq!(revised["Customer"], Value::String("Acme Corp".into()));
    }
}
