//! 大结果协商
//!
//! 某步返回的记录集过大（行 × 列 超过 cell_limit）时，在 waiting_negotiation 闸门暂停，
//! 让用户选择只保留前 N 行继续，或取消。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// [engine.negotiation] 段
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NegotiationPolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 允许直接进入后续步骤的最大单元格数
    #[serde(default = "default_cell_limit")]
    pub cell_limit: usize,
    /// 选择截断时保留的行数
    #[serde(default = "default_truncate_rows")]
    pub truncate_rows: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_cell_limit() -> usize {
    50
}

fn default_truncate_rows() -> usize {
    5
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cell_limit: default_cell_limit(),
            truncate_rows: default_truncate_rows(),
        }
    }
}

/// 暂停中的协商：哪一步的结果、多少行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNegotiation {
    pub step_key: String,
    pub rows: usize,
}

/// 用户对协商的答复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationChoice {
    Truncate,
    Cancel,
}

impl NegotiationPolicy {
    /// 结果过大时返回需要协商的行数
    pub fn check(&self, output: &Value) -> Option<usize> {
        if !self.enabled {
            return None;
        }
        let rows = output.as_array()?;
        let columns = rows.first()?.as_object()?.len();
        (rows.len() * columns > self.cell_limit).then_some(rows.len())
    }

    pub fn prompt(&self, pending: &PendingNegotiation) -> String {
        format!(
            "{} returned {} rows, which is too much data to analyze at once.\n\
             How would you like to proceed?\n\
             1. Analyze the top {} rows only\n\
             2. Cancel",
            pending.step_key, pending.rows, self.truncate_rows
        )
    }

    pub fn truncate(&self, output: &Value) -> Value {
        match output {
            Value::Array(rows) => Value::Array(rows.iter().take(self.truncate_rows).cloned().collect()),
            other => other.clone(),
        }
    }
}

/// 解析协商答复；无输入或无法识别时按截断处理
pub fn interpret(input: Option<&str>) -> NegotiationChoice {
    match input.map(|s| s.trim().to_lowercase()) {
        Some(s) if s == "2" || s == "cancel" || s.starts_with("2.") => NegotiationChoice::Cancel,
        _ => NegotiationChoice::Truncate,
    }
}

/// 用户取消协商时的最终答复
pub fn cancelled_message(pending: &PendingNegotiation) -> String {
    format!(
        "Execution cancelled: {} returned {} rows and the analysis was not continued.",
        pending.step_key, pending.rows
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| json!({"id": i, "a": 1, "b": 2, "c": 3, "d": 4}))
                .collect(),
        )
    }

    #[test]
    fn test_small_result_passes() {
        let policy = NegotiationPolicy::default();
        assert_eq!(policy.check(&rows(10)), None);
        assert_eq!(policy.check(&json!("scalar")), None);
        assert_eq!(policy.check(&json!([1, 2, 3])), None);
    }

    #[test]
    fn test_large_result_needs_negotiation() {
        let policy = NegotiationPolicy::default();
        assert_eq!(policy.check(&rows(11)), Some(11));
    }

    #[test]
    fn test_disabled() {
        let policy = NegotiationPolicy {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(policy.check(&rows(1000)), None);
    }

    #[test]
    fn test_truncate() {
        let policy = NegotiationPolicy::default();
        let out = policy.truncate(&rows(20));
        assert_eq!(out.as_array().map(Vec::len), Some(5));
        assert_eq!(out[0]["id"], json!(0));
    }

    #[test]
    fn test_interpret() {
        assert_eq!(interpret(None), NegotiationChoice::Truncate);
        assert_eq!(interpret(Some("1")), NegotiationChoice::Truncate);
        assert_eq!(interpret(Some("yes")), NegotiationChoice::Truncate);
        assert_eq!(interpret(Some(" Cancel ")), NegotiationChoice::Cancel);
        assert_eq!(interpret(Some("2")), NegotiationChoice::Cancel);
    }
}
