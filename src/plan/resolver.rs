//! 依赖解析：把参数中的 "ref:step_N" / "$step_N" 占位符替换为前序步骤的输出
//!
//! 尽力而为的启发式，不做严格绑定：匹配不到时保留原值或退化为整段字符串，
//! 错误的值由工具自身的校验兜底。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::plan::step_key;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"(?:ref:|\$)step_(\d+)").unwrap())
}

/// 从字符串中提取引用的步骤 id（只取第一个占位符）
pub fn referenced_step(value: &str) -> Option<u32> {
    placeholder_re()
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 解析一份参数表；只做一轮替换，替换结果里的占位符不会再被解析
pub fn resolve(arguments: &Map<String, Value>, results: &BTreeMap<String, Value>) -> Map<String, Value> {
    let mut resolved = arguments.clone();

    for (name, value) in arguments {
        let Some(text) = value.as_str() else {
            continue;
        };
        let Some(step_id) = referenced_step(text) else {
            continue;
        };
        let key = step_key(step_id);

        let previous = match results.get(&key) {
            Some(v) if !is_empty_result(v) => v,
            _ => {
                tracing::warn!(
                    argument = %name,
                    placeholder = %text,
                    "No result recorded for {key}, passing placeholder through"
                );
                continue;
            }
        };

        let substituted = match previous {
            Value::Array(rows) if rows.first().is_some_and(Value::is_object) => {
                match rows[0].get(name) {
                    Some(field) => field.clone(),
                    None => {
                        tracing::warn!(
                            argument = %name,
                            "Field not found in {key} records, falling back to full result text"
                        );
                        Value::String(previous.to_string())
                    }
                }
            }
            other => other.clone(),
        };

        tracing::debug!(argument = %name, "Resolved {text} from {key}");
        resolved.insert(name.clone(), substituted);
    }

    resolved
}

/// 空结果：null、false、0、空串、空数组、空对象
fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn results(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let input = args(json!({"Customer": "ACME", "limit": 10, "flag": true, "nested": {"a": 1}}));
        let res = results(json!({"step_1": [{"Customer": "other"}]}));
        assert_eq!(resolve(&input, &res), input);
    }

    #[test]
    fn test_record_field_matching_argument_name() {
        let input = args(json!({"Invoice_ID": "ref:step_1"}));
        let res = results(json!({"step_1": [{"Invoice_ID": "A1"}]}));
        assert_eq!(resolve(&input, &res), args(json!({"Invoice_ID": "A1"})));
    }

    #[test]
    fn test_dollar_placeholder_syntax() {
        let input = args(json!({"Invoice_ID": "$step_2"}));
        let res = results(json!({"step_2": [{"Invoice_ID": 42, "Amount": 9.5}]}));
        assert_eq!(resolve(&input, &res)["Invoice_ID"], json!(42));
    }

    #[test]
    fn test_record_without_matching_field_falls_back_to_text() {
        let input = args(json!({"ids": "ref:step_1"}));
        let rows = json!([{"Invoice_ID": "A1"}, {"Invoice_ID": "A2"}]);
        let res = results(json!({"step_1": rows.clone()}));
        assert_eq!(resolve(&input, &res)["ids"], Value::String(rows.to_string()));
    }

    #[test]
    fn test_scalar_substituted_directly() {
        let input = args(json!({"total": "ref:step_1", "name": "$step_2"}));
        let res = results(json!({"step_1": 1250, "step_2": "ACME"}));
        let out = resolve(&input, &res);
        assert_eq!(out["total"], json!(1250));
        assert_eq!(out["name"], json!("ACME"));
    }

    #[test]
    fn test_missing_result_passes_through() {
        let input = args(json!({"Invoice_ID": "ref:step_3"}));
        let res = results(json!({"step_1": "x"}));
        assert_eq!(resolve(&input, &res), input);
    }

    #[test]
    fn test_empty_result_passes_through() {
        let input = args(json!({"Invoice_ID": "ref:step_1"}));
        let res = results(json!({"step_1": []}));
        assert_eq!(resolve(&input, &res), input);
    }

    #[test]
    fn test_falsy_scalar_result_passes_through() {
        let input = args(json!({"a": "ref:step_1", "b": "ref:step_2", "c": "$step_3"}));
        let res = results(json!({"step_1": "", "step_2": 0, "step_3": false}));
        assert_eq!(resolve(&input, &res), input);
    }

    #[test]
    fn test_single_pass_only() {
        let input = args(json!({"a": "ref:step_1"}));
        let res = results(json!({"step_1": "ref:step_2", "step_2": "deep"}));
        assert_eq!(resolve(&input, &res)["a"], json!("ref:step_2"));
    }

    #[test]
    fn test_referenced_step() {
        assert_eq!(referenced_step("ref:step_12"), Some(12));
        assert_eq!(referenced_step("use $step_3 here"), Some(3));
        assert_eq!(referenced_step("step_3"), None);
    }
}
