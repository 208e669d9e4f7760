//! RPC methods callable over the gateway socket

use super::protocol::{RpcError, RpcRequest, RpcResponse};
use crate::scan::{ScanError, ScanManager};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct StartScanParams {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CancelScanParams {
    scan_id: String,
}

fn params<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn scan_error(e: ScanError) -> RpcError {
    match e {
        ScanError::InvalidUrl(_) => RpcError::invalid_params(e.to_string()),
        _ => RpcError::rejected(e.to_string()),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}

fn call(method: &str, raw_params: Value, manager: &Arc<ScanManager>) -> Result<Value, RpcError> {
    match method {
        "ping" => Ok(json!("pong")),
        "start_scan" => {
            let p: StartScanParams = params(raw_params)?;
            let summary = manager.start_scan(&p.url).map_err(scan_error)?;
            to_value(&summary)
        }
        "cancel_scan" => {
            let p: CancelScanParams = params(raw_params)?;
            let summary = manager.cancel_scan(&p.scan_id).map_err(scan_error)?;
            to_value(&summary)
        }
        "list_scans" => to_value(&manager.list()),
        "list_agents" => to_value(&manager.roster()),
        _ => Err(RpcError::method_not_found()),
    }
}

/// Handle one request
pub fn dispatch(request: RpcRequest, manager: &Arc<ScanManager>) -> RpcResponse {
    log::debug!("[WS] RPC {} ({})", request.method, request.id);
    match call(&request.method, request.params, manager) {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(error) => {
            log::debug!("[WS] RPC {} failed: {}", request.method, error.message);
            RpcResponse::error(request.id, error)
        }
    }
}
