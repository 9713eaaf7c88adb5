//! 执行状态：ExecutionState 与对外的 EngineResult 投影
//!
//! ExecutionState 是一次计划运行的全部可变状态，只由状态机的节点迁移修改；
//! 每次迁移后整体序列化进检查点。EngineResult 是给调用方看的轻量投影。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::negotiation::PendingNegotiation;
use crate::plan::{Plan, Step};

/// 执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Planning,
    WaitingApproval,
    Executing,
    Failed,
    WaitingHelp,
    WaitingNegotiation,
    Done,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Planning => "planning",
            ExecutionStatus::WaitingApproval => "waiting_approval",
            ExecutionStatus::Executing => "executing",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::WaitingHelp => "waiting_help",
            ExecutionStatus::WaitingNegotiation => "waiting_negotiation",
            ExecutionStatus::Done => "done",
        }
    }

    /// 该阶段是否为闸门（写完检查点后把控制权交还调用方）
    pub fn gate(&self) -> Option<Gate> {
        match self {
            ExecutionStatus::WaitingApproval => Some(Gate::Approval),
            ExecutionStatus::WaitingHelp => Some(Gate::Help),
            ExecutionStatus::WaitingNegotiation => Some(Gate::Negotiation),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Done)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 闸门类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// 计划待审批
    Approval,
    /// 连续失败，等待人工指导
    Help,
    /// 结果过大，等待用户选择截断或取消
    Negotiation,
}

/// 一次计划运行的完整状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// 用户原始请求
    pub request: String,
    pub plan: Option<Plan>,
    /// 下一个要执行的步骤下标（0 起，单调不减）
    pub cursor: usize,
    /// "step_<id>" -> 工具原始输出
    #[serde(default)]
    pub results: BTreeMap<String, Value>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub status: ExecutionStatus,
    /// 暂停时由 resume 写入，下一次 advance 消费后清空
    pub pending_human_input: Option<String>,
    /// 上一版计划被驳回时的反馈，交给规划方重新规划
    #[serde(default)]
    pub rejection_feedback: Option<String>,
    /// 求助之后是否已有人修订过当前步骤参数
    #[serde(default)]
    pub arguments_revised: bool,
    #[serde(default)]
    pub negotiation: Option<PendingNegotiation>,
    pub final_answer: Option<String>,
}

impl ExecutionState {
    /// 新一轮计划运行：cursor=0，results 为空，status=planning
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            plan: None,
            cursor: 0,
            results: BTreeMap::new(),
            retry_count: 0,
            last_error: None,
            status: ExecutionStatus::Planning,
            pending_human_input: None,
            rejection_feedback: None,
            arguments_revised: false,
            negotiation: None,
            final_answer: None,
        }
    }

    /// 驳回后的新一轮：保留请求，携带反馈，其余全部重置
    pub fn replan(&self, feedback: impl Into<String>) -> Self {
        let mut next = Self::new(self.request.clone());
        next.rejection_feedback = Some(feedback.into());
        next
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.plan.as_ref().and_then(|p| p.steps.get(self.cursor))
    }

    pub fn current_step_mut(&mut self) -> Option<&mut Step> {
        let cursor = self.cursor;
        self.plan.as_mut().and_then(|p| p.steps.get_mut(cursor))
    }

    pub fn plan_exhausted(&self) -> bool {
        self.plan
            .as_ref()
            .map(|p| self.cursor >= p.len())
            .unwrap_or(false)
    }

    /// 进入终态
    pub fn finish(&mut self, answer: impl Into<String>) {
        self.status = ExecutionStatus::Done;
        self.final_answer = Some(answer.into());
    }
}

/// 对调用方的返回：当前阶段、终态答复，或闸门类型与要展示给人的说明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineResult {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub status: ExecutionStatus,
    pub gate: Option<Gate>,
    /// 暂停时要展示给人的说明（计划详情 / 错误 / 协商选项）
    pub message: Option<String>,
    pub final_answer: Option<String>,
}

impl EngineResult {
    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_state_defaults() {
        let state = ExecutionState::new("how many invoices?");
        assert_eq!(state.status, ExecutionStatus::Planning);
        assert_eq!(state.cursor, 0);
        assert!(state.results.is_empty());
        assert_eq!(state.retry_count, 0);
        assert!(state.plan.is_none());
    }

    #[test]
    fn test_replan_clears_results() {
        let mut state = ExecutionState::new("q");
        state.results.insert("step_1".into(), json!("x"));
        state.cursor = 1;
        state.status = ExecutionStatus::WaitingApproval;
        let next = state.replan("use last month");
        assert!(next.results.is_empty());
        assert_eq!(next.cursor, 0);
        assert_eq!(next.status, ExecutionStatus::Planning);
        assert_eq!(next.rejection_feedback.as_deref(), Some("use last month"));
        assert_eq!(next.request, "q");
    }

    #[test]
    fn test_gates() {
        assert_eq!(ExecutionStatus::WaitingApproval.gate(), Some(Gate::Approval));
        assert_eq!(ExecutionStatus::WaitingHelp.gate(), Some(Gate::Help));
        assert_eq!(ExecutionStatus::Executing.gate(), None);
        assert!(ExecutionStatus::Done.is_terminal());
        assert!(!ExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let s = serde_json::to_string(&ExecutionStatus::WaitingApproval).unwrap();
        assert_eq!(s, "\"waiting_approval\"");
    }
}
