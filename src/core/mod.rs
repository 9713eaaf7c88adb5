//! 核心编排层：错误、状态、重试升级策略、大结果协商、会话串行化、状态机与构建器

pub mod builder;
pub mod engine;
pub mod error;
pub mod negotiation;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use error::{EngineError, PersistenceError, PlanningError, ToolError};
pub use negotiation::{NegotiationChoice, NegotiationPolicy, PendingNegotiation};
pub use recovery::{decide, give_up_message, EscalationPolicy, RecoveryAction};
pub use session_supervisor::{SessionSupervisor, ThreadGuard};
pub use state::{EngineResult, ExecutionState, ExecutionStatus, Gate};
