//! 引擎错误类型
//!
//! PlanningError / ToolError 在引擎内部被转为状态迁移，不会抛给调用方；
//! PersistenceError 必须上抛（检查点未确认写入时内存状态不可信），由 EngineError 包装。

use thiserror::Error;

/// 规划协作方未能给出结构合法的计划（终止性错误，不重试）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("Planner error: {0}")]
    Collaborator(String),

    #[error("Plan JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Plan has no steps")]
    EmptyPlan,

    #[error("Step ids must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousIds { expected: u32, found: u32 },

    #[error("Step {0} has an empty tool name")]
    MissingToolName(u32),
}

/// 单步工具调用失败（可恢复，交给重试/升级策略）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool '{0}' not found in registry")]
    NotFound(String),

    #[error("Tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },

    /// 工具没有报错，但返回内容命中了错误标记（soft error）
    #[error("Tool '{tool}' returned an error payload: {message}")]
    SoftError { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
}

/// 检查点读写失败
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[cfg(feature = "async-sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt checkpoint {checkpoint_id}: {reason}")]
    Corrupt {
        checkpoint_id: String,
        reason: String,
    },
}

/// 引擎公开接口返回的错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Thread {thread_id} is not waiting for {expected}: current status is {actual}")]
    NotAtGate {
        thread_id: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid amendment: {0}")]
    InvalidAmendment(String),
}
