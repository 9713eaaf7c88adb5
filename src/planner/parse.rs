//! 从 LLM 回复中提取 JSON（```json ... ``` 代码块或最外层花括号）

use serde_json::{Map, Value};

use crate::core::PlanningError;
use crate::plan::Plan;

/// 提取 JSON 片段；找不到时返回 None
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析规划方回复为 Plan（不做结构校验）
pub fn parse_plan(output: &str) -> Result<Plan, PlanningError> {
    let json_str = extract_json(output)
        .ok_or_else(|| PlanningError::JsonParseError(format!("no JSON object in: {}", preview(output))))?;
    serde_json::from_str(json_str)
        .map_err(|e| PlanningError::JsonParseError(format!("{}: {}", e, preview(json_str))))
}

/// 解析参数修订回复：JSON 对象，或包在 {"arguments": {...}} 里
pub fn parse_arguments(output: &str) -> Option<Map<String, Value>> {
    let value: Value = serde_json::from_str(extract_json(output)?).ok()?;
    match value {
        Value::Object(mut map) => match map.remove("arguments") {
            Some(Value::Object(inner)) => Some(inner),
            Some(other) => {
                map.insert("arguments".to_string(), other);
                Some(map)
            }
            None => Some(map),
        },
        _ => None,
    }
}

fn preview(s: &str) -> String {
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_plan() {
        let reply = "Here is the plan:\n```json\n{\"steps\":[{\"id\":1,\"tool_name\":\"echo\",\"arguments\":{\"text\":\"hi\"}}],\"objective\":\"say hi\"}\n```";
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.objective, "say hi");
        assert_eq!(plan.steps[0].arguments["text"], json!("hi"));
    }

    #[test]
    fn test_parse_bare_plan() {
        let reply = "{\"steps\": [], \"objective\": \"nothing\"}";
        let plan = parse_plan(reply).unwrap();
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn test_parse_plan_without_json() {
        assert!(matches!(
            parse_plan("I cannot help with that"),
            Err(PlanningError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_parse_plan_bad_shape() {
        assert!(matches!(
            parse_plan("{\"steps\": \"oops\"}"),
            Err(PlanningError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_parse_arguments() {
        let args = parse_arguments("use {\"arguments\": {\"Date\": \"2024-01-01\"}}").unwrap();
        assert_eq!(args["Date"], json!("2024-01-01"));
        let args = parse_arguments("{\"Date\": null}").unwrap();
        assert_eq!(args["Date"], Value::Null);
        assert!(parse_arguments("no json").is_none());
    }
}
