//! 外部协作方接口：规划方（生成计划 / 修订失败步骤参数）与答复方（汇总最终答案）
//!
//! 引擎只关心计划结构，不关心 prompt 内容；LLM 实现只是其中一种。

pub mod llm_planner;
pub mod parse;
pub mod responder;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::PlanningError;
use crate::plan::{Plan, Step};
use crate::tools::ToolSpec;

pub use llm_planner::LlmPlanner;
pub use parse::{extract_json, parse_arguments, parse_plan};
pub use responder::{LlmResponder, SummaryResponder, RESPONDER_PROMPT_PREFIX};

/// 规划协作方
#[async_trait]
pub trait Planner: Send + Sync {
    /// 根据请求、上一版计划的驳回反馈和工具目录生成计划
    async fn plan(
        &self,
        request: &str,
        feedback: Option<&str>,
        tools: &[ToolSpec],
    ) -> Result<Plan, PlanningError>;

    /// 根据人工指导修订失败步骤的参数；返回 None 表示不修订
    async fn revise_step(
        &self,
        _request: &str,
        _step: &Step,
        _error: &str,
        _guidance: &str,
    ) -> Option<Map<String, Value>> {
        None
    }
}

/// 答复协作方：计划成功执行完后生成给用户的最终答案
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(
        &self,
        request: &str,
        plan: &Plan,
        results: &BTreeMap<String, Value>,
    ) -> Result<String, String>;
}
