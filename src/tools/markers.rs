//! 错误标记约定
//!
//! 有的工具失败时不报错，而是返回一段错误文本（soft error）。
//! 只检查字符串结果：含大写字母的标记区分大小写匹配，全小写的标记忽略大小写匹配。
//! 默认 ["Error", "failed"]：含 "Error"，或小写后含 "failed"。

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMarkers {
    markers: Vec<String>,
}

impl Default for ErrorMarkers {
    fn default() -> Self {
        Self::new(vec!["Error".to_string(), "failed".to_string()])
    }
}

impl ErrorMarkers {
    pub fn new(markers: Vec<String>) -> Self {
        Self {
            markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
        }
    }

    pub fn matches(&self, output: &Value) -> bool {
        let Some(text) = output.as_str() else {
            return false;
        };
        let lower = text.to_lowercase();
        self.markers.iter().any(|marker| {
            if marker.chars().any(char::is_uppercase) {
                text.contains(marker.as_str())
            } else {
                lower.contains(marker.as_str())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_markers() {
        let markers = ErrorMarkers::default();
        assert!(markers.matches(&json!("System Error executing sp_x: timeout")));
        assert!(markers.matches(&json!("Query FAILED")));
        assert!(!markers.matches(&json!("error in lowercase only")));
        assert!(!markers.matches(&json!("42 rows")));
        assert!(!markers.matches(&json!([{"status": "Error"}])));
        assert!(!markers.matches(&json!(0)));
    }

    #[test]
    fn test_custom_markers() {
        let markers = ErrorMarkers::new(vec!["denied".into(), String::new()]);
        assert!(markers.matches(&json!("Access Denied")));
        assert!(!markers.matches(&json!("ok")));
    }
}
