//! Planloom - 可恢复的多步计划执行引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态机、执行状态、重试升级策略、大结果协商、会话串行化、构建器
//! - **plan**: Plan / Step 数据模型、结构校验、步骤间依赖解析
//! - **checkpoint**: 检查点链与存储（内存 / SQLite）
//! - **tools**: 工具 trait、注册表、执行器（超时 + soft error 标记）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **planner**: 规划方与答复方
//! - **observability**: 日志初始化

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod planner;
pub mod tools;

pub use crate::core::{Engine, EngineBuilder, EngineError, EngineResult, ExecutionStatus, Gate};
