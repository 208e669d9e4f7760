//! Agent factory and sequential crew orchestration
//!
//! A scan is run by a crew of four agents. Each task is handed to the agent of
//! its role together with the outputs of the tasks it depends on:
//! crawl -> recon -> test -> fix.

pub mod agent;
pub mod factory;
pub mod orchestrator;
pub mod presets;
pub mod tasks;
pub mod types;

pub use agent::Agent;
pub use factory::{AgentFactory, AgentInfo};
pub use orchestrator::Crew;
pub use presets::{default_presets, load_agent_presets};
pub use tasks::build_scan_crew;
pub use types::{AgentPreset, AgentRole, CrewOutput, TaskOutput, TaskSpec};
