//! 记录集工具：由配置声明的静态数据表，按参数过滤后返回记录数组
//!
//! 形态与存储过程一致（参数 -> 记录集），便于在没有真实数据库时跑通多步计划和步骤间引用。

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::tools::Tool;

/// [[tools.records]] 条目
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 参数名 -> 说明；与列同名的参数作为等值过滤条件
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
}

pub struct RecordsTool {
    config: RecordsToolConfig,
}

impl RecordsTool {
    pub fn new(config: RecordsToolConfig) -> Self {
        Self { config }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 空值、空串、"None" 视为未传参
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || s == "None",
        _ => false,
    }
}

#[async_trait]
impl Tool for RecordsTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        self.config.parameters.clone()
    }

    fn returns(&self) -> Vec<String> {
        self.config
            .rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        let filters: Vec<(&String, String)> = args
            .iter()
            .filter(|(_, v)| !is_unset(v))
            .map(|(k, v)| (k, as_text(v)))
            .collect();

        let matched: Vec<Value> = self
            .config
            .rows
            .iter()
            .filter(|row| {
                filters.iter().all(|(column, expected)| match row.get(*column) {
                    Some(actual) => as_text(actual) == *expected,
                    None => true,
                })
            })
            .cloned()
            .map(Value::Object)
            .collect();

        if matched.is_empty() {
            return Ok(Value::String(
                "Query executed successfully but returned no data (Empty Result).".to_string(),
            ));
        }
        Ok(Value::Array(matched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> RecordsTool {
        let rows = json!([
            {"Invoice_ID": "A1", "Customer": "ACME", "Amount": 10},
            {"Invoice_ID": "A2", "Customer": "ACME", "Amount": 25},
            {"Invoice_ID": "B1", "Customer": "Globex", "Amount": 7}
        ]);
        RecordsTool::new(RecordsToolConfig {
            name: "get_invoices".into(),
            description: "Invoices by customer".into(),
            parameters: BTreeMap::from([("Customer".into(), "Customer name".into())]),
            rows: serde_json::from_value(rows).unwrap(),
        })
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_filter_by_column() {
        let out = tool().execute(args(json!({"Customer": "ACME"}))).await.unwrap();
        assert_eq!(out.as_array().map(Vec::len), Some(2));
        assert_eq!(out[0]["Invoice_ID"], json!("A1"));
    }

    #[tokio::test]
    async fn test_numeric_filter_and_unset_args() {
        let out = tool()
            .execute(args(json!({"Amount": 7, "Customer": "None"})))
            .await
            .unwrap();
        assert_eq!(out[0]["Invoice_ID"], json!("B1"));
    }

    #[tokio::test]
    async fn test_empty_result_message() {
        let out = tool().execute(args(json!({"Customer": "Initech"}))).await.unwrap();
        assert!(out.as_str().unwrap().contains("no data"));
    }

    #[test]
    fn test_returns_columns() {
        let columns = tool().returns();
        assert!(columns.contains(&"Invoice_ID".to_string()));
    }
}
