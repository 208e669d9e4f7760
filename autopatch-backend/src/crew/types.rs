//! Crew types: agent roles, presets, tasks and their outputs

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// The specialized roles of a scan crew
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentRole {
    Crawler,
    FormScout,
    VulnTester,
    Fixer,
}

impl AgentRole {
    /// Role title used in prompts and log labels
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Crawler => "Site Crawler",
            AgentRole::FormScout => "Website Reconnaissance Specialist",
            AgentRole::VulnTester => "Vulnerability Tester",
            AgentRole::Fixer => "Security Fix Engineer",
        }
    }

    /// Words that attribute a log line to this role: the role title plus the
    /// tools that only this role owns in the default presets
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            AgentRole::Crawler => &["Site Crawler", "crawl_site"],
            AgentRole::FormScout => &["Website Reconnaissance Specialist", "find_forms"],
            AgentRole::VulnTester => &[
                "Vulnerability Tester",
                "submit_form",
                "xss_probe",
                "idor_probe",
                "header_check",
            ],
            AgentRole::Fixer => &["Security Fix Engineer"],
        }
    }
}

/// How an agent of a given role is configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPreset {
    pub role: AgentRole,
    pub goal: String,
    pub backstory: String,
    /// Tool names resolved against the registry when the agent is built
    pub tools: Vec<String>,
    pub allow_delegation: bool,
    pub verbose: bool,
}

/// One unit of work for a crew
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    pub expected_output: String,
    pub agent: AgentRole,
    /// Ids of earlier tasks whose outputs this task receives
    #[serde(default)]
    pub context: Vec<String>,
}

impl TaskSpec {
    pub fn new(
        id: impl Into<String>,
        agent: AgentRole,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ids: &[&str]) -> Self {
        self.context = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// What one task produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: String,
    pub agent: AgentRole,
    pub description: String,
    pub raw: String,
}

/// Result of a full crew run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewOutput {
    pub tasks: Vec<TaskOutput>,
    /// Output of the last task
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_role_names_round_trip_through_strum() {
        for role in AgentRole::iter() {
            assert_eq!(AgentRole::from_str(role.as_ref()).unwrap(), role);
        }
        assert_eq!(AgentRole::VulnTester.to_string(), "vuln_tester");
        assert!(AgentRole::from_str("hacker").is_err());
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&AgentRole::FormScout).unwrap();
        assert_eq!(json, "\"form_scout\"");
    }

    #[test]
    fn test_every_role_has_keywords() {
        for role in AgentRole::iter() {
            assert!(!role.keywords().is_empty());
            assert!(role.keywords().contains(&role.display_name()));
        }
    }
}
