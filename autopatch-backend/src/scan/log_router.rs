//! Attributes scan output lines to the agent that produced them

use crate::crew::AgentRole;
use regex::Regex;
use serde::Serialize;
use strum::IntoEnumIterator;

/// Who a log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    System,
    Agent(AgentRole),
}

impl LogSource {
    /// Stable key sent to clients
    pub fn key(&self) -> &'static str {
        match self {
            LogSource::System => "system",
            LogSource::Agent(role) => role.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LogSource::System => "System",
            LogSource::Agent(role) => role.display_name(),
        }
    }
}

/// Keyword classifier with memory of the previous line's source.
///
/// The agent whose keyword appears earliest in a line wins. Lines without any
/// keyword belong to the same source as the line before.
pub struct LogRouter {
    patterns: Vec<(AgentRole, Regex)>,
    current: LogSource,
}

impl Default for LogRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRouter {
    pub fn new() -> Self {
        let patterns = AgentRole::iter()
            .filter_map(|role| {
                let alternatives: Vec<String> =
                    role.keywords().iter().map(|k| regex::escape(k)).collect();
                match Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))) {
                    Ok(re) => Some((role, re)),
                    Err(e) => {
                        log::error!("[SCAN] Invalid keyword pattern for {}: {}", role, e);
                        None
                    }
                }
            })
            .collect();

        Self {
            patterns,
            current: LogSource::System,
        }
    }

    pub fn classify(&mut self, line: &str) -> LogSource {
        let earliest = self
            .patterns
            .iter()
            .filter_map(|(role, re)| re.find(line).map(|m| (m.start(), *role)))
            .min_by_key(|(start, _)| *start);

        if let Some((_, role)) = earliest {
            self.current = LogSource::Agent(role);
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_as_system_and_sticks_to_last_agent() {
        let mut router = LogRouter::new();
        assert_eq!(router.classify("Received scan request for http://a.test"), LogSource::System);
        assert_eq!(
            router.classify("# Agent: Site Crawler"),
            LogSource::Agent(AgentRole::Crawler)
        );
        assert_eq!(
            router.classify("Visited http://a.test/ [200]"),
            LogSource::Agent(AgentRole::Crawler)
        );
        assert_eq!(
            router.classify("## Using tool: find_forms"),
            LogSource::Agent(AgentRole::FormScout)
        );
    }

    #[test]
    fn test_earliest_keyword_wins() {
        let mut router = LogRouter::new();
        assert_eq!(
            router.classify("## Using tool: xss_probe on pages found by the crawler"),
            LogSource::Agent(AgentRole::VulnTester)
        );
        assert_eq!(
            router.classify("The SITE CRAWLER handed results to the Vulnerability Tester"),
            LogSource::Agent(AgentRole::Crawler)
        );
    }

    #[test]
    fn test_shared_tools_and_plain_words_keep_the_current_agent() {
        let mut router = LogRouter::new();
        let tester = LogSource::Agent(AgentRole::VulnTester);
        assert_eq!(router.classify("# Agent: Vulnerability Tester"), tester);
        assert_eq!(router.classify("## Using tool: get_form_fields"), tester);
        assert_eq!(
            router.classify("## Final Answer: reflected XSS in q; patch the template"),
            tester
        );
        assert_eq!(router.classify("Remediation: escape output while crawling"), tester);
        assert_eq!(router.classify("the crawler and the fixer agreed"), tester);
    }

    #[test]
    fn test_keywords_need_word_boundaries() {
        let mut router = LogRouter::new();
        assert_eq!(router.classify("recrawlers and dispatches"), LogSource::System);
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(LogSource::System.key(), "system");
        assert_eq!(LogSource::Agent(AgentRole::FormScout).key(), "form_scout");
        assert_eq!(
            LogSource::Agent(AgentRole::VulnTester).label(),
            "Vulnerability Tester"
        );
    }
}
