//! 计划 JSON Schema 生成（schemars 自动生成）
//!
//! 用于将合法 Plan 的 JSON 结构注入规划 prompt，减少 LLM 输出格式错误。

use schemars::schema_for;

use crate::plan::Plan;

/// 返回 Plan 的 JSON Schema 字符串，可拼入 system prompt
pub fn plan_schema_json() -> String {
    let schema = schema_for!(Plan);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
