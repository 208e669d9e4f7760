use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types for gateway broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ScanStarted,
    ScanLog,
    ScanCompleted,
    ScanFailed,
    ScanCancelled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanStarted => "scan.started",
            Self::ScanLog => "scan.log",
            Self::ScanCompleted => "scan.completed",
            Self::ScanFailed => "scan.failed",
            Self::ScanCancelled => "scan.cancelled",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

/// JSON-RPC request from client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: String, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: String, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(-32603, message)
    }

    /// Request was valid but cannot be served right now (scan limit, unknown scan)
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(-32000, message)
    }
}

/// Server-push event to all connected clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "type")]
    pub type_: String,
    pub event: String,
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            type_: "event".to_string(),
            event: event.into(),
            data,
        }
    }

    /// `scan` is the serialized scan summary
    pub fn scan_started(scan: Value) -> Self {
        Self::new(EventType::ScanStarted, scan)
    }

    /// One classified line of scan output
    pub fn scan_log(scan_id: &str, agent: &str, agent_label: &str, line: &str, timestamp: &str) -> Self {
        Self::new(
            EventType::ScanLog,
            serde_json::json!({
                "scan_id": scan_id,
                "agent": agent,
                "agent_label": agent_label,
                "line": line,
                "timestamp": timestamp
            }),
        )
    }

    pub fn scan_completed(scan_id: &str, result: &str) -> Self {
        Self::new(
            EventType::ScanCompleted,
            serde_json::json!({
                "scan_id": scan_id,
                "result": result
            }),
        )
    }

    pub fn scan_failed(scan_id: &str, error: &str) -> Self {
        Self::new(
            EventType::ScanFailed,
            serde_json::json!({
                "scan_id": scan_id,
                "error": error
            }),
        )
    }

    pub fn scan_cancelled(scan_id: &str) -> Self {
        Self::new(
            EventType::ScanCancelled,
            serde_json::json!({
                "scan_id": scan_id
            }),
        )
    }

    /// True for the events that end a scan
    pub fn is_terminal(&self) -> bool {
        [
            EventType::ScanCompleted,
            EventType::ScanFailed,
            EventType::ScanCancelled,
        ]
        .iter()
        .any(|t| t.as_str() == self.event)
    }

    pub fn scan_id(&self) -> Option<&str> {
        self.data.get("scan_id").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = GatewayEvent::scan_log("s1", "crawler", "Site Crawler", "Visited /", "2024-01-01T00:00:00Z");
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "event",
                "event": "scan.log",
                "data": {
                    "scan_id": "s1",
                    "agent": "crawler",
                    "agent_label": "Site Crawler",
                    "line": "Visited /",
                    "timestamp": "2024-01-01T00:00:00Z"
                }
            })
        );
        assert!(!event.is_terminal());
        assert_eq!(event.scan_id(), Some("s1"));
    }

    #[test]
    fn test_terminal_events() {
        assert!(GatewayEvent::scan_completed("s", "ok").is_terminal());
        assert!(GatewayEvent::scan_failed("s", "boom").is_terminal());
        assert!(GatewayEvent::scan_cancelled("s").is_terminal());
        assert!(!GatewayEvent::scan_started(json!({"id": "s"})).is_terminal());
    }

    #[test]
    fn test_rpc_response_skips_empty_fields() {
        let ok = serde_json::to_value(RpcResponse::success("1".into(), json!("pong"))).unwrap();
        assert_eq!(ok, json!({"id": "1", "result": "pong"}));

        let err = serde_json::to_value(RpcResponse::error("2".into(), RpcError::method_not_found())).unwrap();
        assert_eq!(err, json!({"id": "2", "error": {"code": -32601, "message": "Method not found"}}));
    }

    #[test]
    fn test_request_params_default_to_null() {
        let req: RpcRequest = serde_json::from_str(r#"{"id":"1","method":"ping"}"#).unwrap();
        assert_eq!(req.params, Value::Null);
    }
}
