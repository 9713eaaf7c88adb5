//! 计划层：Plan / Step 数据模型、结构校验、步骤间依赖解析

pub mod resolver;
pub mod types;

pub use resolver::{referenced_step, resolve};
pub use types::{step_key, Plan, Step, StepId};
