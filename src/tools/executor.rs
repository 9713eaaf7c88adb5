//! 工具执行器
//!
//! 持有 ToolRegistry、单次调用超时与错误标记，execute(tool_name, args) 在超时内调用工具，
//! 找不到工具、报错、超时、返回 soft error 时统一转为 ToolError；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::ToolError;
use crate::tools::{ErrorMarkers, ToolRegistry, ToolSpec};

/// 工具执行器：超时策略属于这一层，引擎本身不计时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    markers: ErrorMarkers,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            markers: ErrorMarkers::default(),
        }
    }

    pub fn with_markers(mut self, markers: ErrorMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// 执行指定工具并分类结果；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Map<String, Value>) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let classified = match result {
            Ok(Ok(output)) if tool.is_error_payload(&output, &self.markers) => {
                Err(ToolError::SoftError {
                    tool: tool_name.to_string(),
                    message: output.as_str().map(str::to_string).unwrap_or_else(|| output.to_string()),
                })
            }
            Ok(Ok(output)) => Ok(output),
            Ok(Err(message)) => Err(ToolError::Failed {
                tool: tool_name.to_string(),
                message,
            }),
            Err(_) => Err(ToolError::Timeout {
                tool: tool_name.to_string(),
                secs: self.timeout.as_secs(),
            }),
        };

        let outcome = match &classified {
            Ok(_) => "ok",
            Err(ToolError::SoftError { .. }) => "soft_error",
            Err(ToolError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": classified.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        classified
    }

    pub fn catalogue(&self) -> Vec<ToolSpec> {
        self.registry.catalogue()
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("late"))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Value, String> {
            Err("connection refused".to_string())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(SlowTool);
        registry.register(BrokenTool);
        ToolExecutor::new(registry, 30)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_success() {
        let out = executor()
            .execute("echo", args(json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(out, json!("hi"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let err = executor().execute("nope", Map::new()).await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("nope".into()));
    }

    #[tokio::test]
    async fn test_raised_error() {
        let err = executor().execute("broken", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_soft_error_payload() {
        let err = executor()
            .execute("echo", args(json!({"text": "System Error executing sp_x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SoftError { .. }));
        assert!(err.to_string().contains("System Error executing sp_x"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::new(registry, 1);
        let err = executor.execute("slow", Map::new()).await.unwrap_err();
        assert_eq!(
            err,
            ToolError::Timeout {
                tool: "slow".into(),
                secs: 1
            }
        );
    }
}
