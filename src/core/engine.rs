//! 编排状态机与中断 / 恢复协议
//!
//! `advance` 只做一个工作单元（一次规划、一次闸门输入消费、一次工具调用或一次收尾），不做持久化；
//! `start` / `resume` 在每次 `advance` 之后写检查点，遇到闸门或终态时把控制权交还调用方。
//!
//! 闸门：waiting_approval、waiting_help、waiting_negotiation。
//! 规划错误与工具错误在这里被转成状态迁移；只有持久化错误会返回给调用方。

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::core::negotiation::{self, NegotiationChoice, NegotiationPolicy, PendingNegotiation};
use crate::core::recovery::{give_up_message, EscalationPolicy, RecoveryAction};
use crate::core::{
    EngineError, EngineResult, ExecutionState, ExecutionStatus, Gate, SessionSupervisor,
};
use crate::plan::resolve;
use crate::planner::{Planner, Responder, SummaryResponder};
use crate::tools::ToolExecutor;

/// 默认的「照计划继续」输入
pub fn default_affirmative_tokens() -> Vec<String> {
    ["yes", "y", "approve", "ok", "proceed"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// 编排引擎：持有检查点存储、工具执行器与外部协作方，构造时注入
pub struct Engine {
    store: Arc<dyn CheckpointStore>,
    executor: Arc<ToolExecutor>,
    planner: Arc<dyn Planner>,
    responder: Arc<dyn Responder>,
    escalation: EscalationPolicy,
    negotiation: NegotiationPolicy,
    affirmative_tokens: Vec<String>,
    supervisor: SessionSupervisor,
}

impl Engine {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        executor: Arc<ToolExecutor>,
        planner: Arc<dyn Planner>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            store,
            executor,
            planner,
            responder,
            escalation: EscalationPolicy::default(),
            negotiation: NegotiationPolicy::default(),
            affirmative_tokens: default_affirmative_tokens(),
            supervisor: SessionSupervisor::new(),
        }
    }

    pub fn with_escalation(mut self, escalation: EscalationPolicy) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn with_negotiation(mut self, negotiation: NegotiationPolicy) -> Self {
        self.negotiation = negotiation;
        self
    }

    pub fn with_affirmative_tokens(mut self, tokens: Vec<String>) -> Self {
        self.affirmative_tokens = tokens.into_iter().map(|t| t.to_lowercase()).collect();
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// 执行一个工作单元，返回迁移后的状态
    pub async fn advance(&self, mut state: ExecutionState) -> ExecutionState {
        match state.status {
            ExecutionStatus::Planning => self.plan(&mut state).await,
            ExecutionStatus::WaitingApproval => {
                match state.pending_human_input.take() {
                    None => {
                        tracing::info!("Plan approved, executing");
                        state.status = ExecutionStatus::Executing;
                    }
                    Some(feedback) => {
                        tracing::info!("Plan rejected, replanning with feedback: {}", feedback);
                        state = state.replan(feedback);
                    }
                }
            }
            ExecutionStatus::Executing => self.execute_step(&mut state).await,
            ExecutionStatus::Failed => self.recover(&mut state).await,
            ExecutionStatus::WaitingHelp => self.apply_guidance(&mut state).await,
            ExecutionStatus::WaitingNegotiation => self.settle_negotiation(&mut state).await,
            ExecutionStatus::Done => {}
        }
        state
    }

    async fn plan(&self, state: &mut ExecutionState) {
        let tools = self.executor.catalogue();
        let planned = self
            .planner
            .plan(&state.request, state.rejection_feedback.as_deref(), &tools)
            .await
            .and_then(|plan| plan.validate().map(|_| plan));
        match planned {
            Ok(plan) => {
                tracing::info!("Plan produced: {} steps", plan.len());
                state.plan = Some(plan);
                state.status = ExecutionStatus::WaitingApproval;
            }
            Err(e) => {
                tracing::warn!("Planning failed: {}", e);
                state.plan = None;
                state.last_error = Some(format!("Planning failed: {e}"));
                state.status = ExecutionStatus::Failed;
            }
        }
    }

    async fn execute_step(&self, state: &mut ExecutionState) {
        if state.plan.is_none() {
            let reason = state
                .last_error
                .clone()
                .unwrap_or_else(|| "Planning failed: no plan".to_string());
            state.finish(reason);
            return;
        }
        let Some(step) = state.current_step().cloned() else {
            self.complete(state).await;
            return;
        };

        if state.retry_count >= self.escalation.ask_human_at && !state.arguments_revised {
            tracing::warn!(
                "Retrying step {} ({}) with unchanged arguments after asking for help",
                step.id,
                step.tool_name
            );
        }

        let arguments = resolve(&step.arguments, &state.results);
        let preview = Value::Object(arguments.clone()).to_string();
        tracing::debug!("Step {} ({}) args: {}", step.id, step.tool_name, preview);

        match self.executor.execute(&step.tool_name, arguments).await {
            Ok(output) => {
                tracing::info!("Step {} ({}) succeeded", step.id, step.tool_name);
                let key = step.result_key();
                let oversized = self.negotiation.check(&output);
                state.results.insert(key.clone(), output);
                state.cursor += 1;
                state.retry_count = 0;
                state.last_error = None;
                state.arguments_revised = false;

                if let Some(rows) = oversized {
                    tracing::info!("{} returned {} rows, asking how to proceed", key, rows);
                    state.negotiation = Some(PendingNegotiation {
                        step_key: key,
                        rows,
                    });
                    state.status = ExecutionStatus::WaitingNegotiation;
                } else {
                    // 最后一步成功后也先落检查点，答复在下一个工作单元生成
                    state.status = ExecutionStatus::Executing;
                }
            }
            Err(e) => {
                tracing::warn!("Step {} ({}) failed: {}", step.id, step.tool_name, e);
                state.last_error = Some(e.to_string());
                state.status = ExecutionStatus::Failed;
            }
        }
    }

    async fn recover(&self, state: &mut ExecutionState) {
        let last_error = state.last_error.clone().unwrap_or_default();
        if state.plan.is_none() {
            state.finish(last_error);
            return;
        }

        state.retry_count += 1;
        match self.escalation.decide(state.retry_count) {
            RecoveryAction::Retry => {
                if self.escalation.is_guided(state.retry_count) {
                    tracing::info!("Retrying with human guidance (failure {})", state.retry_count);
                } else {
                    tracing::info!("Retrying automatically (failure {})", state.retry_count);
                }
                state.status = ExecutionStatus::Executing;
            }
            RecoveryAction::AskHuman => {
                tracing::info!("Failure {}, asking for help", state.retry_count);
                state.status = ExecutionStatus::WaitingHelp;
            }
            RecoveryAction::GiveUp => {
                tracing::warn!("Giving up after {} failures", state.retry_count);
                state.finish(give_up_message(&last_error));
            }
        }
    }

    async fn apply_guidance(&self, state: &mut ExecutionState) {
        if let Some(guidance) = state.pending_human_input.take() {
            if let Some(step) = state.current_step().cloned() {
                let error = state.last_error.clone().unwrap_or_default();
                match self
                    .planner
                    .revise_step(&state.request, &step, &error, &guidance)
                    .await
                {
                    Some(arguments) => {
                        tracing::info!("Step {} arguments revised from guidance", step.id);
                        if let Some(current) = state.current_step_mut() {
                            current.arguments = arguments;
                        }
                        state.arguments_revised = true;
                    }
                    None => {
                        tracing::warn!("Guidance for step {} produced no argument changes", step.id);
                    }
                }
            }
        }
        state.status = ExecutionStatus::Executing;
    }

    async fn settle_negotiation(&self, state: &mut ExecutionState) {
        let input = state.pending_human_input.take();
        let Some(pending) = state.negotiation.take() else {
            state.status = ExecutionStatus::Executing;
            return;
        };

        match negotiation::interpret(input.as_deref()) {
            NegotiationChoice::Cancel => {
                tracing::info!("Negotiation cancelled for {}", pending.step_key);
                state.finish(negotiation::cancelled_message(&pending));
            }
            NegotiationChoice::Truncate => {
                if let Some(text) = input.as_deref() {
                    if !matches!(text.trim(), "1" | "truncate") && !text.trim().starts_with("1.") {
                        tracing::info!("Unrecognized negotiation reply '{}', truncating", text);
                    }
                }
                if let Some(output) = state.results.get(&pending.step_key) {
                    let truncated = self.negotiation.truncate(output);
                    state.results.insert(pending.step_key.clone(), truncated);
                }
                state.status = ExecutionStatus::Executing;
            }
        }
    }

    /// 计划全部成功：交给答复方生成最终答案，失败时退回到逐步列出结果
    async fn complete(&self, state: &mut ExecutionState) {
        let Some(plan) = state.plan.as_ref() else {
            state.finish("Planning failed: no plan");
            return;
        };
        let answer = match self
            .responder
            .respond(&state.request, plan, &state.results)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Responder failed ({}), falling back to summary", e);
                match SummaryResponder.respond(&state.request, plan, &state.results).await {
                    Ok(answer) => answer,
                    Err(e) => format!("Completed: {} ({})", plan.objective, e),
                }
            }
        };
        state.finish(answer);
    }

    /// 新建一次计划运行；已有历史的 thread 会在原链上接续
    pub async fn start(&self, thread_id: &str, request: &str) -> Result<EngineResult, EngineError> {
        let _guard = self.supervisor.acquire(thread_id).await;
        let parent = self
            .store
            .get_latest(thread_id)
            .await?
            .map(|c| c.checkpoint_id);
        let state = ExecutionState::new(request);
        let checkpoint_id = self.store.put(thread_id, &state, parent.as_deref()).await?;
        tracing::info!("Thread {} started", thread_id);
        self.drive(thread_id, state, checkpoint_id).await
    }

    /// 从最新检查点继续；input 为空或为肯定词表示照计划继续
    pub async fn resume(
        &self,
        thread_id: &str,
        input: Option<&str>,
    ) -> Result<EngineResult, EngineError> {
        let _guard = self.supervisor.acquire(thread_id).await;
        let latest = self
            .store
            .get_latest(thread_id)
            .await?
            .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))?;

        let Checkpoint {
            checkpoint_id,
            mut state,
            ..
        } = latest;
        if state.status.is_terminal() {
            return Ok(self.project(thread_id, &checkpoint_id, &state));
        }
        if state.status.gate().is_some() {
            state.pending_human_input = self.normalize_input(input);
        } else if input.is_some() {
            tracing::warn!(
                "Thread {} is {}, not at a gate; ignoring input",
                thread_id,
                state.status
            );
        }
        self.drive(thread_id, state, checkpoint_id).await
    }

    /// 重新接入已有会话：停在闸门或已结束时只返回当前投影，等人给出输入；
    /// 执行中途中断的会话从最新检查点继续推进
    pub async fn reattach(&self, thread_id: &str) -> Result<EngineResult, EngineError> {
        let current = self
            .status(thread_id)
            .await?
            .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))?;
        if current.gate.is_some() || current.is_done() {
            return Ok(current);
        }
        tracing::info!("Thread {} interrupted while {}, continuing", thread_id, current.status);
        self.resume(thread_id, None).await
    }

    /// 在 waiting_help 暂停期间由外部替换当前步骤参数；线程保持暂停
    pub async fn amend_step(
        &self,
        thread_id: &str,
        arguments: Map<String, Value>,
    ) -> Result<EngineResult, EngineError> {
        let _guard = self.supervisor.acquire(thread_id).await;
        let latest = self
            .store
            .get_latest(thread_id)
            .await?
            .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))?;

        let mut state = latest.state;
        if state.status != ExecutionStatus::WaitingHelp {
            return Err(EngineError::NotAtGate {
                thread_id: thread_id.to_string(),
                expected: ExecutionStatus::WaitingHelp.to_string(),
                actual: state.status.to_string(),
            });
        }
        if arguments.is_empty() {
            return Err(EngineError::InvalidAmendment("arguments are empty".to_string()));
        }
        let Some(step) = state.current_step_mut() else {
            return Err(EngineError::InvalidAmendment("no current step".to_string()));
        };
        step.arguments = arguments;
        let step_id = step.id;
        state.arguments_revised = true;

        let checkpoint_id = self
            .store
            .put(thread_id, &state, Some(&latest.checkpoint_id))
            .await?;
        tracing::info!("Thread {} step {} amended", thread_id, step_id);
        Ok(self.project(thread_id, &checkpoint_id, &state))
    }

    /// 完整检查点历史，最早的在前
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, EngineError> {
        Ok(self.store.list(thread_id).await?)
    }

    /// 最新检查点的投影；未知 thread 返回 None
    pub async fn status(&self, thread_id: &str) -> Result<Option<EngineResult>, EngineError> {
        Ok(self
            .store
            .get_latest(thread_id)
            .await?
            .map(|c| self.project(thread_id, &c.checkpoint_id, &c.state)))
    }

    async fn drive(
        &self,
        thread_id: &str,
        mut state: ExecutionState,
        mut parent: String,
    ) -> Result<EngineResult, EngineError> {
        loop {
            let from = state.status;
            state = self.advance(state).await;
            parent = self.store.put(thread_id, &state, Some(&parent)).await?;
            tracing::info!("Thread {}: {} -> {}", thread_id, from, state.status);

            if state.status.gate().is_some() || state.status.is_terminal() {
                return Ok(self.project(thread_id, &parent, &state));
            }
        }
    }

    fn normalize_input(&self, input: Option<&str>) -> Option<String> {
        let text = input?.trim();
        if text.is_empty() || self.affirmative_tokens.contains(&text.to_lowercase()) {
            None
        } else {
            Some(text.to_string())
        }
    }

    fn project(&self, thread_id: &str, checkpoint_id: &str, state: &ExecutionState) -> EngineResult {
        let gate = state.status.gate();
        let message = gate.map(|gate| match gate {
            Gate::Approval => state
                .plan
                .as_ref()
                .map(|p| p.render())
                .unwrap_or_default(),
            Gate::Help => {
                let step = state
                    .current_step()
                    .map(|s| format!("Step {} ({})", s.id, s.tool_name))
                    .unwrap_or_else(|| "Current step".to_string());
                format!(
                    "{} failed {} times.\nLast error: {}\n\
                     Reply with guidance to revise the arguments, or press enter to retry as is.",
                    step,
                    state.retry_count,
                    state.last_error.as_deref().unwrap_or("unknown")
                )
            }
            Gate::Negotiation => state
                .negotiation
                .as_ref()
                .map(|p| self.negotiation.prompt(p))
                .unwrap_or_default(),
        });
        EngineResult {
            thread_id: thread_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
            status: state.status,
            gate,
            message,
            final_answer: state.final_answer.clone(),
        }
    }
}
