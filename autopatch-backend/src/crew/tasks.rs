use super::factory::AgentFactory;
use super::orchestrator::Crew;
use super::types::{AgentRole, TaskSpec};
use strum::IntoEnumIterator;

/// The standard scan: crawl, then recon, then test, then fix
pub fn scan_tasks(url: &str) -> Vec<TaskSpec> {
    vec![
        TaskSpec::new(
            "crawl",
            AgentRole::Crawler,
            format!(
                "Crawl the website starting at {url} with the crawl_site tool. Stay on the same \
                 origin. Your final answer must list every page you reached with its status and \
                 form count, and point out URLs that carry numeric identifiers."
            ),
            "A site map: one line per page with URL, HTTP status, title and number of forms, \
             followed by the URLs that look like object references.",
        ),
        TaskSpec::new(
            "recon",
            AgentRole::FormScout,
            format!(
                "Access the website at {url} and the pages from the site map, and identify all \
                 the forms available on them. Use get_form_fields to describe the inputs of each \
                 form. Your final answer must be a list of all the forms you found."
            ),
            "A comprehensive list detailing each form found: page URL, form number, method, \
             action and its fields.",
        )
        .with_context(&["crawl"]),
        TaskSpec::new(
            "test",
            AgentRole::VulnTester,
            format!(
                "Test the application at {url} for vulnerabilities. Probe the forms from the recon \
                 report with xss_probe, probe URLs with identifiers with idor_probe, and run \
                 header_check on the main pages. Report only findings the tools support."
            ),
            "A findings report: for each issue the affected URL and input, the evidence from the \
             tool output, and a severity.",
        )
        .with_context(&["crawl", "recon"]),
        TaskSpec::new(
            "fix",
            AgentRole::Fixer,
            format!(
                "Write remediation guidance for every confirmed finding on {url}. Order the fixes \
                 by severity."
            ),
            "A prioritised list of fixes with a short explanation and a code or configuration \
             change for each.",
        )
        .with_context(&["recon", "test"]),
    ]
}

/// Build the four-agent scan crew for `url`
pub fn build_scan_crew(factory: &AgentFactory, url: &str) -> Result<Crew, String> {
    let agents = AgentRole::iter()
        .map(|role| factory.build(role))
        .collect::<Result<Vec<_>, _>>()?;
    Crew::new(agents, scan_tasks(url))
}
