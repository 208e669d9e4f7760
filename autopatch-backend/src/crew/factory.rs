use super::agent::Agent;
use super::types::{AgentPreset, AgentRole};
use crate::ai::ChatModel;
use crate::tools::ToolRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Public view of a configured agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub role: AgentRole,
    pub name: String,
    pub goal: String,
    pub tools: Vec<String>,
}

/// Builds agents from presets, sharing one model and one tool registry
pub struct AgentFactory {
    llm: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    presets: BTreeMap<AgentRole, AgentPreset>,
    max_iterations: usize,
}

impl AgentFactory {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        presets: BTreeMap<AgentRole, AgentPreset>,
        max_iterations: usize,
    ) -> Self {
        Self {
            llm,
            registry,
            presets,
            max_iterations,
        }
    }

    pub fn preset(&self, role: AgentRole) -> Option<&AgentPreset> {
        self.presets.get(&role)
    }

    /// Build the agent for `role`, resolving its tool names
    pub fn build(&self, role: AgentRole) -> Result<Agent, String> {
        let preset = self
            .presets
            .get(&role)
            .cloned()
            .ok_or_else(|| format!("No preset configured for agent role '{}'", role))?;
        let tools = self
            .registry
            .tools_for(&preset.tools)
            .map_err(|e| format!("Cannot build {}: {}", role.display_name(), e))?;
        log::debug!(
            "[CREW] Built {} with model {} and tools [{}]",
            role.display_name(),
            self.llm.model_name(),
            preset.tools.join(", ")
        );
        Ok(Agent::new(preset, self.llm.clone(), tools, self.max_iterations))
    }

    pub fn roster(&self) -> Vec<AgentInfo> {
        self.presets
            .values()
            .map(|p| AgentInfo {
                role: p.role,
                name: p.role.display_name().to_string(),
                goal: p.goal.clone(),
                tools: p.tools.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::scripted::ScriptedModel;
    use crate::crew::presets::default_presets;
    use crate::tools::create_default_registry;

    fn factory(presets: BTreeMap<AgentRole, AgentPreset>) -> AgentFactory {
        AgentFactory::new(
            Arc::new(ScriptedModel::new(vec![])),
            Arc::new(create_default_registry()),
            presets,
            4,
        )
    }

    #[test]
    fn test_build_resolves_tools() {
        let agent = factory(default_presets()).build(AgentRole::VulnTester).unwrap();
        assert_eq!(agent.role(), AgentRole::VulnTester);
        assert_eq!(
            agent.tool_names(),
            vec!["submit_form", "xss_probe", "idor_probe", "header_check", "get_form_fields"]
        );
    }

    #[test]
    fn test_unknown_tool_fails_build() {
        let mut presets = default_presets();
        if let Some(p) = presets.get_mut(&AgentRole::Crawler) {
            p.tools.push("port_scan".to_string());
        }
        let err = factory(presets).build(AgentRole::Crawler).unwrap_err();
        assert!(err.contains("Unknown tool 'port_scan'"));
        assert!(err.starts_with("Cannot build Site Crawler"));
    }

    #[test]
    fn test_missing_preset_fails_build() {
        let mut presets = default_presets();
        presets.remove(&AgentRole::Fixer);
        assert!(factory(presets).build(AgentRole::Fixer).is_err());
    }

    #[test]
    fn test_roster_lists_every_role() {
        let roster = factory(default_presets()).roster();
        let roles: Vec<AgentRole> = roster.iter().map(|a| a.role).collect();
        assert_eq!(
            roles,
            vec![
                AgentRole::Crawler,
                AgentRole::FormScout,
                AgentRole::VulnTester,
                AgentRole::Fixer
            ]
        );
        assert_eq!(roster[1].name, "Website Reconnaissance Specialist");
    }
}
