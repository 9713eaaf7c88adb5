//! Echo 工具（测试用）

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::Tool;

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back (for testing)."
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("text".to_string(), "Text to echo back".to_string())])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        let text = args
            .get("text")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "(empty)".to_string());
        Ok(Value::String(text))
    }
}
