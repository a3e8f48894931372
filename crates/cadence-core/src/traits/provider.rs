//! LLM and tool-invocation collaborators used by workflow executors.

use async_trait::async_trait;

use crate::error::{CadenceError, Result};
use crate::types::{ChatMessage, ChatResponse, ToolDefinition};

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse>;
}

/// Tool-invocation context handed to executors.
#[async_trait]
pub trait ToolHost: Send + Sync {
    fn tools(&self) -> Vec<ToolDefinition>;

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<String>;
}

/// Host with no tools.
pub struct NoTools;

#[async_trait]
impl ToolHost for NoTools {
    fn tools(&self) -> Vec<ToolDefinition> {
        vec![]
    }

    async fn call_tool(&self, name: &str, _arguments: serde_json::Value) -> Result<String> {
        Err(CadenceError::execution(format!("no tool host: cannot call '{name}'")))
    }
}
