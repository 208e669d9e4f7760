use crate::browser::BrowserLauncher;
use crate::config::CrawlLimits;
use crate::scan::ScanLogger;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Tool groups, used to describe tools in the agent roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolGroup {
    /// Discovery: crawling and form enumeration
    #[default]
    Recon,
    /// Active requests that submit data to the target
    Probe,
    /// Passive analysis of responses
    Audit,
}

impl ToolGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolGroup::Recon => "recon",
            ToolGroup::Probe => "probe",
            ToolGroup::Audit => "audit",
        }
    }
}

/// JSON Schema property definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    fn of(schema_type: &str, description: &str) -> Self {
        PropertySchema {
            schema_type: schema_type.to_string(),
            description: description.to_string(),
            default: None,
            items: None,
            enum_values: None,
        }
    }

    pub fn string(description: &str) -> Self {
        Self::of("string", description)
    }

    pub fn integer(description: &str) -> Self {
        Self::of("integer", description)
    }

    pub fn object(description: &str) -> Self {
        Self::of("object", description)
    }

    pub fn array_of_strings(description: &str) -> Self {
        PropertySchema {
            items: Some(Box::new(Self::of("string", "item"))),
            ..Self::of("array", description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Tool input schema using JSON Schema format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: vec![],
        }
    }
}

/// Tool definition that gets sent to the AI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
    #[serde(skip)]
    pub group: ToolGroup,
}

/// Result of tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: content.into(),
            error: None,
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let msg = message.into();
        ToolResult {
            success: false,
            content: msg.clone(),
            error: Some(msg),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Context provided to tools during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Opens a fresh browser session per tool call
    pub launcher: Arc<dyn BrowserLauncher>,
    pub crawl: CrawlLimits,
    pub scan_id: Option<String>,
    /// Sink for progress lines shown to the user
    pub logger: Option<ScanLogger>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("launcher", &self.launcher.name())
            .field("crawl", &self.crawl)
            .field("scan_id", &self.scan_id)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl ToolContext {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, crawl: CrawlLimits) -> Self {
        ToolContext {
            launcher,
            crawl,
            scan_id: None,
            logger: None,
        }
    }

    pub fn with_scan(mut self, scan_id: String, logger: ScanLogger) -> Self {
        self.scan_id = Some(scan_id);
        self.logger = Some(logger);
        self
    }

    /// Emit a progress line to the scan log, if one is attached
    pub fn progress(&self, line: impl Into<String>) {
        if let Some(logger) = &self.logger {
            logger.log(line);
        }
    }
}

/// Deserialize a usize from either a number or a string
pub fn deserialize_usize_lenient<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize)),
        Some(Value::String(s)) => Ok(s.trim().parse().ok()),
        _ => Ok(None),
    }
}

/// Parse tool parameters, turning serde errors into an error result
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params).map_err(|e| ToolResult::error(format!("Invalid parameters: {}", e)))
}

/// Validate that a parameter is an absolute http(s) URL with a host
pub fn parse_target_url(raw: &str) -> Result<url::Url, ToolResult> {
    let raw = raw.trim();
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        return Err(ToolResult::error(format!(
            "URL must start with http:// or https:// (got '{}')",
            raw
        )));
    }
    let url = url::Url::parse(raw).map_err(|e| ToolResult::error(format!("Invalid URL '{}': {}", raw, e)))?;
    if url.host_str().is_none_or(|h| h.is_empty()) {
        return Err(ToolResult::error(format!("URL '{}' has no host", raw)));
    }
    Ok(url)
}

/// Standard single `url` parameter schema
pub fn url_property() -> PropertySchema {
    PropertySchema::string("Absolute http(s) URL of the target page")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_usize() {
        #[derive(Deserialize)]
        struct P {
            #[serde(default, deserialize_with = "deserialize_usize_lenient")]
            n: Option<usize>,
        }
        let p: P = serde_json::from_value(json!({"n": "3"})).unwrap();
        assert_eq!(p.n, Some(3));
        let p: P = serde_json::from_value(json!({"n": 4})).unwrap();
        assert_eq!(p.n, Some(4));
        let p: P = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.n, None);
        let p: P = serde_json::from_value(json!({"n": "x"})).unwrap();
        assert_eq!(p.n, None);
    }

    #[test]
    fn test_parse_target_url() {
        assert!(parse_target_url("http://shop.test/a").is_ok());
        assert!(parse_target_url(" https://shop.test ").is_ok());
        let err = parse_target_url("ftp://shop.test").unwrap_err();
        assert!(!err.success);
        assert!(err.content.contains("http://"));
        assert!(parse_target_url("shop.test").is_err());
        assert!(parse_target_url("http://").is_err());
    }

    #[test]
    fn test_schema_serialization() {
        let schema = PropertySchema::array_of_strings("payloads");
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "array");
        assert_eq!(value["items"]["type"], "string");
        assert!(value.get("default").is_none());
    }

    #[test]
    fn test_error_result_mirrors_message() {
        let result = ToolResult::error("boom");
        assert!(!result.success);
        assert_eq!(result.content, "boom");
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
