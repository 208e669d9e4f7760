pub mod openai;
pub mod types;

#[cfg(test)]
pub mod scripted;

pub use openai::OpenAIClient;
pub use types::{AiResponse, ToolCall, ToolHistoryEntry, ToolResponse};

use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A hosted language model the agents reason with.
///
/// Every agent of a crew shares one `ChatModel`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logging
    fn model_name(&self) -> &str;

    /// Generate a response that may request tool calls
    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, String>;

    /// Generate a plain text response
    async fn generate_text(&self, messages: Vec<Message>) -> Result<String, String> {
        let response = self.generate_with_tools(messages, vec![], vec![]).await?;
        Ok(response.content)
    }
}
