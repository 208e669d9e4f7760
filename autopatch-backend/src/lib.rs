//! Autopatch: a crew of LLM agents that crawls a web application, probes it
//! for common vulnerabilities and proposes fixes, streaming its work to a UI.

pub mod ai;
pub mod browser;
pub mod config;
pub mod controllers;
pub mod crew;
pub mod gateway;
pub mod scan;
pub mod tools;

use config::Config;
use gateway::EventBroadcaster;
use scan::ScanManager;
use std::sync::Arc;

/// Shared state handed to every HTTP handler
pub struct AppState {
    pub config: Config,
    pub scans: Arc<ScanManager>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Name of the active browser backend
    pub launcher_name: &'static str,
}
