//! Scan runs: one crew per target URL, its output relayed line by line

pub mod log_router;
pub mod logger;
pub mod manager;

pub use log_router::{LogRouter, LogSource};
pub use logger::ScanLogger;
pub use manager::{ScanError, ScanLogLine, ScanManager, ScanStatus, ScanSummary};
