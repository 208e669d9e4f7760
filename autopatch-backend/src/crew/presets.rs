//! Built-in agent presets and their `agents.ron` overrides

use super::types::{AgentPreset, AgentRole};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use strum::IntoEnumIterator;

pub const AGENTS_FILE: &str = "agents.ron";

/// Default preset for a role
pub fn default_preset(role: AgentRole) -> AgentPreset {
    let (goal, backstory, tools): (&str, &str, &[&str]) = match role {
        AgentRole::Crawler => (
            "Map the target website by crawling every reachable page on the same origin, \
             without wasting requests on pages that share a URL pattern.",
            "You are a methodical web crawler. You follow links breadth-first, note which pages \
             carry forms or take identifiers in their URLs, and hand a clean site map to the \
             rest of the team.",
            &["crawl_site"],
        ),
        AgentRole::FormScout => (
            "Scan the provided URL to identify all web forms present on the page.",
            "As a seasoned web crawler expert, your primary objective is to meticulously map out \
             the structure of a target website. You specialize in identifying interactive \
             elements, especially forms, which are critical entry points for security testing.",
            &["find_forms", "get_form_fields"],
        ),
        AgentRole::VulnTester => (
            "Test the discovered pages and forms for reflected XSS, insecure direct object \
             references and missing security headers, and report only what the tools confirm.",
            "You are a careful penetration tester. You probe inputs with harmless marker \
             payloads, compare responses for neighbouring object ids and audit response headers. \
             You never claim a vulnerability that the evidence does not support.",
            &[
                "submit_form",
                "xss_probe",
                "idor_probe",
                "header_check",
                "get_form_fields",
            ],
        ),
        AgentRole::Fixer => (
            "Turn the confirmed findings into concrete, prioritised fixes the site's developers \
             can apply.",
            "You are a security engineer who writes remediation guidance. For each finding you \
             explain the risk in one sentence and give the code or configuration change that \
             removes it.",
            &[],
        ),
    };

    AgentPreset {
        role,
        goal: goal.to_string(),
        backstory: backstory.to_string(),
        tools: tools.iter().map(|t| t.to_string()).collect(),
        allow_delegation: false,
        verbose: true,
    }
}

pub fn default_presets() -> BTreeMap<AgentRole, AgentPreset> {
    AgentRole::iter().map(|r| (r, default_preset(r))).collect()
}

/// Per-role override as written in `agents.ron`; absent fields keep the default
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PresetOverride {
    goal: Option<String>,
    backstory: Option<String>,
    tools: Option<Vec<String>>,
    allow_delegation: Option<bool>,
    verbose: Option<bool>,
}

impl PresetOverride {
    fn apply(self, preset: &mut AgentPreset) {
        if let Some(goal) = self.goal {
            preset.goal = goal;
        }
        if let Some(backstory) = self.backstory {
            preset.backstory = backstory;
        }
        if let Some(tools) = self.tools {
            preset.tools = tools;
        }
        if let Some(allow) = self.allow_delegation {
            preset.allow_delegation = allow;
        }
        if let Some(verbose) = self.verbose {
            preset.verbose = verbose;
        }
    }
}

/// Load presets from `{config_dir}/agents.ron` on top of the defaults.
///
/// A missing file is not an error. A file that fails to parse, or an unknown
/// role key, is logged and the defaults are kept.
pub fn load_agent_presets(config_dir: &Path) -> BTreeMap<AgentRole, AgentPreset> {
    let mut presets = default_presets();
    let path = config_dir.join(AGENTS_FILE);

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("[CREW] No {} found, using built-in agent presets", path.display());
            return presets;
        }
        Err(e) => {
            log::warn!("[CREW] Failed to read {}: {}", path.display(), e);
            return presets;
        }
    };

    let overrides: HashMap<String, PresetOverride> = match ron::from_str(&content) {
        Ok(o) => o,
        Err(e) => {
            log::error!("[CREW] Failed to parse {}: {}", path.display(), e);
            return presets;
        }
    };

    for (key, override_) in overrides {
        match AgentRole::from_str(&key) {
            Ok(role) => {
                if let Some(preset) = presets.get_mut(&role) {
                    override_.apply(preset);
                }
            }
            Err(_) => log::warn!("[CREW] Ignoring unknown agent role '{}' in {}", key, path.display()),
        }
    }

    log::info!("[CREW] Loaded agent presets from {}", path.display());
    presets
}
