//! Scan lifecycle: registration, background runs, log relay and cancellation

use super::log_router::LogRouter;
use super::logger::ScanLogger;
use crate::browser::BrowserLauncher;
use crate::config::CrawlLimits;
use crate::crew::{build_scan_crew, AgentFactory, AgentInfo};
use crate::gateway::protocol::GatewayEvent;
use crate::gateway::EventBroadcaster;
use crate::tools::types::parse_target_url;
use crate::tools::ToolContext;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ScanStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub id: String,
    pub url: String,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub log_lines: usize,
}

/// One relayed line of scan output
#[derive(Debug, Clone, Serialize)]
pub struct ScanLogLine {
    pub agent: String,
    pub agent_label: String,
    pub line: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    InvalidUrl(String),
    TooManyScans(usize),
    NotFound(String),
    NotRunning(String),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::InvalidUrl(msg) => write!(f, "{}", msg),
            ScanError::TooManyScans(max) => {
                write!(f, "Too many scans running (limit {}), try again later", max)
            }
            ScanError::NotFound(id) => write!(f, "Scan '{}' not found", id),
            ScanError::NotRunning(id) => write!(f, "Scan '{}' is not running", id),
        }
    }
}

impl std::error::Error for ScanError {}

struct ScanHandle {
    summary: RwLock<ScanSummary>,
    logs: RwLock<Vec<ScanLogLine>>,
    cancel: CancellationToken,
}

enum Outcome {
    Completed(String),
    Failed(String),
    Cancelled,
}

/// Owns every scan of the process; scans are kept in memory only
pub struct ScanManager {
    scans: DashMap<String, Arc<ScanHandle>>,
    factory: Arc<AgentFactory>,
    launcher: Arc<dyn BrowserLauncher>,
    crawl: CrawlLimits,
    broadcaster: Arc<EventBroadcaster>,
    max_concurrent: usize,
    start_lock: Mutex<()>,
}

impl ScanManager {
    pub fn new(
        factory: Arc<AgentFactory>,
        launcher: Arc<dyn BrowserLauncher>,
        crawl: CrawlLimits,
        broadcaster: Arc<EventBroadcaster>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            scans: DashMap::new(),
            factory,
            launcher,
            crawl,
            broadcaster,
            max_concurrent: max_concurrent.max(1),
            start_lock: Mutex::new(()),
        }
    }

    pub fn broadcaster(&self) -> Arc<EventBroadcaster> {
        self.broadcaster.clone()
    }

    pub fn roster(&self) -> Vec<AgentInfo> {
        self.factory.roster()
    }

    fn running_count(&self) -> usize {
        self.scans
            .iter()
            .filter(|entry| entry.value().summary.read().status == ScanStatus::Running)
            .count()
    }

    /// Register a scan of `url` and run it in the background
    pub fn start_scan(self: &Arc<Self>, url: &str) -> Result<ScanSummary, ScanError> {
        let target = parse_target_url(url).map_err(|r| ScanError::InvalidUrl(r.content))?;

        let handle = {
            let _guard = self.start_lock.lock();
            if self.running_count() >= self.max_concurrent {
                log::warn!("[SCAN] Rejected scan of {}: {} already running", target, self.max_concurrent);
                return Err(ScanError::TooManyScans(self.max_concurrent));
            }

            let handle = Arc::new(ScanHandle {
                summary: RwLock::new(ScanSummary {
                    id: uuid::Uuid::new_v4().to_string(),
                    url: target.to_string(),
                    status: ScanStatus::Running,
                    created_at: Utc::now(),
                    finished_at: None,
                    result: None,
                    error: None,
                    log_lines: 0,
                }),
                logs: RwLock::new(Vec::new()),
                cancel: CancellationToken::new(),
            });
            let id = handle.summary.read().id.clone();
            self.scans.insert(id, handle.clone());
            handle
        };

        let summary = handle.summary.read().clone();
        log::info!("[SCAN] Started scan {} of {}", summary.id, summary.url);
        self.broadcaster
            .broadcast(GatewayEvent::scan_started(serde_json::to_value(&summary).unwrap_or_default()));

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let run = tokio::spawn({
                let manager = Arc::clone(&manager);
                let handle = handle.clone();
                async move { manager.run(handle).await }
            });
            if let Err(e) = run.await {
                manager.fail_crashed(&handle, e);
            }
        });

        Ok(summary)
    }

    /// Close out a scan whose background run died before reporting an outcome
    fn fail_crashed(&self, handle: &ScanHandle, error: tokio::task::JoinError) {
        let reason = if error.is_panic() {
            let payload = error.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            format!("Scan run panicked: {}", message)
        } else {
            "Scan run was aborted".to_string()
        };

        let scan_id = {
            let mut summary = handle.summary.write();
            if summary.status.is_finished() {
                return;
            }
            summary.status = ScanStatus::Failed;
            summary.finished_at = Some(Utc::now());
            summary.error = Some(reason.clone());
            summary.id.clone()
        };

        log::error!("[SCAN] Scan {} crashed: {}", scan_id, reason);
        self.broadcaster
            .broadcast(GatewayEvent::scan_failed(&scan_id, &reason));
    }

    async fn run(&self, handle: Arc<ScanHandle>) {
        let (scan_id, url) = {
            let summary = handle.summary.read();
            (summary.id.clone(), summary.url.clone())
        };

        let (logger, rx) = ScanLogger::channel();
        let relay = tokio::spawn(relay_logs(
            rx,
            handle.clone(),
            self.broadcaster.clone(),
            scan_id.clone(),
        ));

        logger.log(format!("Received scan request for {}", url));
        let tool_context =
            ToolContext::new(self.launcher.clone(), self.crawl).with_scan(scan_id.clone(), logger.clone());

        let outcome = match build_scan_crew(&self.factory, &url) {
            Err(e) => Outcome::Failed(e),
            Ok(crew) => {
                tokio::select! {
                    _ = handle.cancel.cancelled() => Outcome::Cancelled,
                    result = crew.kickoff(&tool_context, &logger) => match result {
                        Ok(output) => Outcome::Completed(output.raw),
                        Err(e) => Outcome::Failed(e),
                    },
                }
            }
        };

        match &outcome {
            Outcome::Completed(raw) => {
                logger.log("--- SCAN COMPLETE ---");
                logger.log(format!("Final Result: {}", raw));
            }
            Outcome::Failed(e) => logger.log(format!("--- SCAN FAILED ---\nError: {}", e)),
            Outcome::Cancelled => logger.log("--- SCAN CANCELLED ---"),
        }

        // The relay ends once every logger clone is gone
        drop(tool_context);
        drop(logger);
        if let Err(e) = relay.await {
            log::error!("[SCAN] Log relay for {} panicked: {}", scan_id, e);
        }

        let event = {
            let mut summary = handle.summary.write();
            summary.finished_at = Some(Utc::now());
            match outcome {
                Outcome::Completed(raw) => {
                    summary.status = ScanStatus::Completed;
                    let event = GatewayEvent::scan_completed(&scan_id, &raw);
                    summary.result = Some(raw);
                    event
                }
                Outcome::Failed(e) => {
                    summary.status = ScanStatus::Failed;
                    let event = GatewayEvent::scan_failed(&scan_id, &e);
                    summary.error = Some(e);
                    event
                }
                Outcome::Cancelled => {
                    summary.status = ScanStatus::Cancelled;
                    GatewayEvent::scan_cancelled(&scan_id)
                }
            }
        };

        log::info!("[SCAN] Scan {} finished: {}", scan_id, event.event);
        self.broadcaster.broadcast(event);
    }

    /// Request cancellation of a running scan
    pub fn cancel_scan(&self, id: &str) -> Result<ScanSummary, ScanError> {
        let handle = self
            .scans
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ScanError::NotFound(id.to_string()))?;

        let summary = handle.summary.read().clone();
        if summary.status.is_finished() {
            return Err(ScanError::NotRunning(id.to_string()));
        }
        log::info!("[SCAN] Cancelling scan {}", id);
        handle.cancel.cancel();
        Ok(summary)
    }

    pub fn get(&self, id: &str) -> Option<ScanSummary> {
        self.scans.get(id).map(|entry| entry.value().summary.read().clone())
    }

    /// All scans, newest first
    pub fn list(&self) -> Vec<ScanSummary> {
        let mut scans: Vec<ScanSummary> = self
            .scans
            .iter()
            .map(|entry| entry.value().summary.read().clone())
            .collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        scans
    }

    pub fn logs(&self, id: &str) -> Option<Vec<ScanLogLine>> {
        self.scans.get(id).map(|entry| entry.value().logs.read().clone())
    }
}

/// Classify, store and broadcast every line until the loggers are dropped
async fn relay_logs(
    mut rx: mpsc::UnboundedReceiver<String>,
    handle: Arc<ScanHandle>,
    broadcaster: Arc<EventBroadcaster>,
    scan_id: String,
) {
    let mut router = LogRouter::new();
    while let Some(line) = rx.recv().await {
        let source = router.classify(&line);
        let entry = ScanLogLine {
            agent: source.key().to_string(),
            agent_label: source.label().to_string(),
            line,
            timestamp: Utc::now().to_rfc3339(),
        };
        broadcaster.broadcast(GatewayEvent::scan_log(
            &scan_id,
            &entry.agent,
            &entry.agent_label,
            &entry.line,
            &entry.timestamp,
        ));
        handle.logs.write().push(entry);
        handle.summary.write().log_lines += 1;
    }
}
