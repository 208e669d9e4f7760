use crate::ai::types::{AiResponse, ToolCall, ToolHistoryEntry, ToolResponse};
use crate::ai::{ChatModel, Message};
use crate::config::LlmConfig;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Client for OpenAI-compatible chat completion endpoints (OpenRouter by default)
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAIClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        // Only add auth header if API key is provided and not empty
        if !config.api_key.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?;
            headers.insert(header::AUTHORIZATION, auth_value);
        } else {
            log::warn!("[OPENAI] No API key configured for {}", config.endpoint);
        }

        // OpenRouter attribution headers
        if !config.referer.is_empty() {
            let referer = header::HeaderValue::from_str(&config.referer)
                .map_err(|e| format!("Invalid referer header: {}", e))?;
            headers.insert(header::REFERER, referer);
        }
        if !config.app_title.is_empty() {
            let title = header::HeaderValue::from_str(&config.app_title)
                .map_err(|e| format!("Invalid app title header: {}", e))?;
            headers.insert("x-title", title);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        tool_history: &[ToolHistoryEntry],
        tools: &[ToolDefinition],
    ) -> OpenAICompletionRequest {
        let mut api_messages: Vec<OpenAIMessage> = messages
            .into_iter()
            .map(|m| OpenAIMessage {
                role: m.role.to_string(),
                content: Some(m.content),
                tool_calls: None,
                tool_call_id: None,
            })
            .collect();

        for entry in tool_history {
            api_messages.extend(Self::build_tool_result_messages(
                &entry.tool_calls,
                &entry.tool_responses,
            ));
            if let Some(follow_up) = &entry.follow_up {
                api_messages.push(OpenAIMessage {
                    role: follow_up.role.to_string(),
                    content: Some(follow_up.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
        }

        let openai_tools: Option<Vec<OpenAITool>> = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| OpenAITool {
                        tool_type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: serde_json::to_value(&t.input_schema)
                                .unwrap_or_else(|_| json!({"type": "object", "properties": {}})),
                        },
                    })
                    .collect(),
            )
        };

        OpenAICompletionRequest {
            model: self.model.clone(),
            messages: api_messages,
            max_tokens: self.max_tokens,
            tool_choice: openai_tools.as_ref().map(|_| "auto".to_string()),
            tools: openai_tools,
        }
    }

    /// Build tool result messages for continuing after tool execution
    pub fn build_tool_result_messages(
        tool_calls: &[ToolCall],
        tool_responses: &[ToolResponse],
    ) -> Vec<OpenAIMessage> {
        let mut messages = Vec::new();

        let openai_tool_calls: Vec<OpenAIToolCall> = tool_calls
            .iter()
            .map(|tc| OpenAIToolCall {
                id: tc.id.clone(),
                call_type: "function".to_string(),
                function: OpenAIFunctionCall {
                    name: tc.name.clone(),
                    arguments: serde_json::to_string(&tc.arguments).unwrap_or_default(),
                },
            })
            .collect();

        messages.push(OpenAIMessage {
            role: "assistant".to_string(),
            content: Some(String::new()), // some providers require content even when empty
            tool_calls: Some(openai_tool_calls),
            tool_call_id: None,
        });

        for response in tool_responses {
            messages.push(OpenAIMessage {
                role: "tool".to_string(),
                content: Some(response.content.clone()),
                tool_calls: None,
                tool_call_id: Some(response.tool_call_id.clone()),
            });
        }

        messages
    }
}

/// Parse a successful completion body into an `AiResponse`
fn parse_completion(body: &str) -> Result<AiResponse, String> {
    let response_data: OpenAICompletionResponse = serde_json::from_str(body)
        .map_err(|e| format!("Failed to parse completion response: {} - body: {}", e, body))?;

    let choice = response_data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| "Completion response contained no choices".to_string())?;

    log::info!(
        "[OPENAI] Response - content_len: {}, tool_calls: {}, finish_reason: {:?}",
        choice.message.content.as_ref().map(|c| c.len()).unwrap_or(0),
        choice.message.tool_calls.as_ref().map(|t| t.len()).unwrap_or(0),
        choice.finish_reason
    );

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            arguments: serde_json::from_str(&tc.function.arguments).unwrap_or(json!({})),
            id: tc.id,
            name: tc.function.name,
        })
        .collect();

    let content = choice.message.content.unwrap_or_default();
    let is_tool_use = choice.finish_reason.as_deref() == Some("tool_calls") || !tool_calls.is_empty();

    Ok(AiResponse {
        content,
        tool_calls,
        stop_reason: Some(if is_tool_use { "tool_use" } else { "end_turn" }.to_string()),
    })
}

/// Turn an error body into a readable message
fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(error_response) => format!("LLM API error: {}", error_response.error.message),
        Err(_) => format!("LLM API returned error status: {}, body: {}", status, body),
    }
}

#[async_trait]
impl ChatModel for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, String> {
        let request = self.build_request(messages, &tool_history, &tools);

        log::info!(
            "[OPENAI] Sending request to {} with model {} and {} tools",
            self.endpoint,
            self.model,
            request.tools.as_ref().map(|t| t.len()).unwrap_or(0)
        );
        log::debug!(
            "[OPENAI] Full request:\n{}",
            serde_json::to_string_pretty(&request).unwrap_or_default()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("LLM API request failed: {}", e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read LLM response: {}", e))?;

        if !status.is_success() {
            return Err(describe_error(status, &response_text));
        }

        log::debug!("[OPENAI] Raw response:\n{}", response_text);
        parse_completion(&response_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{PropertySchema, ToolGroup, ToolInputSchema};
    use std::collections::HashMap;

    fn test_client() -> OpenAIClient {
        OpenAIClient::from_config(&LlmConfig {
            api_key: "sk-test".to_string(),
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            model: "test-model".to_string(),
            max_tokens: 512,
            referer: "http://localhost:5000".to_string(),
            app_title: "Autopatch".to_string(),
        })
        .unwrap()
    }

    fn url_tool() -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert("url".to_string(), PropertySchema::string("Target URL"));
        ToolDefinition {
            name: "find_forms".to_string(),
            description: "Find forms".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties,
                required: vec!["url".to_string()],
            },
            group: ToolGroup::Recon,
        }
    }

    #[test]
    fn test_parse_text_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Done."},"finish_reason":"stop"}]}"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.content, "Done.");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn test_parse_tool_call_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"call_1","type":"function","function":{"name":"find_forms","arguments":"{\"url\":\"http://a.test/\"}"}},
            {"id":"call_2","type":"function","function":{"name":"header_check","arguments":"not json"}}
        ]},"finish_reason":"tool_calls"}]}"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].name, "find_forms");
        assert_eq!(response.tool_calls[0].arguments["url"], "http://a.test/");
        assert_eq!(response.tool_calls[1].arguments, json!({}));
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_parse_empty_choices_is_error() {
        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
        assert!(parse_completion("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn test_describe_error_prefers_provider_message() {
        let msg = describe_error(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"No auth credentials found","code":401}}"#,
        );
        assert_eq!(msg, "LLM API error: No auth credentials found");

        let msg = describe_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(msg.contains("502"));
        assert!(msg.contains("upstream down"));
    }

    #[test]
    fn test_request_includes_tools_and_history() {
        let client = test_client();
        let history = vec![ToolHistoryEntry::new(
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "find_forms".to_string(),
                arguments: json!({"url": "http://a.test/"}),
            }],
            vec![ToolResponse::success("call_1".to_string(), "Found 1 forms".to_string())],
        )];
        let request = client.build_request(
            vec![Message::system("sys"), Message::user("go")],
            &history,
            &[url_tool()],
        );

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "test-model");
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["parameters"]["required"][0], "url");
        assert_eq!(
            value["tools"][0]["function"]["parameters"]["properties"]["url"]["type"],
            "string"
        );

        let messages = value["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "find_forms");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_follow_up_is_sent_after_its_tool_results() {
        let client = test_client();
        let mut entry = ToolHistoryEntry::new(
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "find_forms".to_string(),
                arguments: json!({"url": "http://a.test/"}),
            }],
            vec![ToolResponse::success("call_1".to_string(), "Found 0 forms".to_string())],
        );
        entry.follow_up = Some(Message::user("Answer now."));
        let request = client.build_request(
            vec![Message::system("sys"), Message::user("go")],
            &[entry],
            &[],
        );

        let roles: Vec<&str> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "user"]);
        assert_eq!(request.messages[4].content.as_deref(), Some("Answer now."));
        assert!(request.tools.is_none());
    }

    #[test]
    fn test_request_without_tools_omits_tool_choice() {
        let client = test_client();
        let request = client.build_request(vec![Message::user("hello")], &[], &[]);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }
}
