//! Provider-neutral types for tool-calling conversations

use super::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The result of a tool invocation, returned to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResponse {
    pub fn success(tool_call_id: String, content: String) -> Self {
        Self {
            tool_call_id,
            content,
            is_error: false,
        }
    }

    pub fn error(tool_call_id: String, content: String) -> Self {
        Self {
            tool_call_id,
            content,
            is_error: true,
        }
    }
}

/// One round of tool calls together with their responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHistoryEntry {
    pub tool_calls: Vec<ToolCall>,
    pub tool_responses: Vec<ToolResponse>,
    /// Sent right after this round's tool results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<Message>,
}

impl ToolHistoryEntry {
    pub fn new(tool_calls: Vec<ToolCall>, tool_responses: Vec<ToolResponse>) -> Self {
        Self {
            tool_calls,
            tool_responses,
            follow_up: None,
        }
    }
}

/// A single model completion
#[derive(Debug, Clone, Default)]
pub struct AiResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// "tool_use" when the model asked for tools, "end_turn" otherwise
    pub stop_reason: Option<String>,
}

impl AiResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            stop_reason: Some("end_turn".to_string()),
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            stop_reason: Some("tool_use".to_string()),
        }
    }

    pub fn is_tool_use(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
