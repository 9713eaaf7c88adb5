//! LLM 客户端抽象
//!
//! 推理服务是外部协作方：规划方与答复方都只通过 LlmClient::complete 使用它。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}
