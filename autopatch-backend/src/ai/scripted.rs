//! Scripted model for tests: replays canned responses and records every request

use super::{AiResponse, ChatModel, Message, ToolHistoryEntry};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// What the model was asked in one call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub history_len: usize,
    /// Follow-up message of the latest tool round, if any
    pub follow_up: Option<String>,
    pub tool_names: Vec<String>,
}

pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<AiResponse, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<AiResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_error(&self, error: &str) {
        self.responses.lock().push_back(Err(error.to_string()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, String> {
        self.calls.lock().push(RecordedCall {
            messages,
            history_len: tool_history.len(),
            follow_up: tool_history
                .last()
                .and_then(|entry| entry.follow_up.as_ref())
                .map(|m| m.content.clone()),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("scripted model has no more responses".to_string()))
    }
}
