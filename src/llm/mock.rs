//! Mock LLM 客户端（用于测试与无 API Key 时的本地运行）
//!
//! 规划请求：返回一步 echo 计划（回显用户请求）；答复请求：把收集到的数据原样总结。

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{LlmClient, Message, Role};
use crate::planner::RESPONDER_PROMPT_PREFIX;

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        if last_user.starts_with(RESPONDER_PROMPT_PREFIX) {
            return Ok(format!("Summary from Mock:\n{last_user}"));
        }

        let plan = json!({
            "steps": [{
                "id": 1,
                "tool_name": "echo",
                "arguments": {"text": format!("Echo from Mock: {last_user}")},
                "description": "Echo the request back"
            }],
            "objective": format!("Answer: {last_user}")
        });
        Ok(format!("```json\n{plan}\n```"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::parse_plan;

    #[tokio::test]
    async fn test_mock_produces_valid_plan() {
        let reply = MockLlmClient
            .complete(&[Message::system("plan"), Message::user("count invoices")])
            .await
            .unwrap();
        let plan = parse_plan(&reply).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool_name, "echo");
        assert!(plan.validate().is_ok());
    }
}
