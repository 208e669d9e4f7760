//! Built-in browser tools
//!
//! Each tool opens a fresh browser session through the context's launcher,
//! performs one task and returns a plain-text summary for the agent.
//! - recon: `crawl_site`, `find_forms`, `get_form_fields`
//! - probe: `submit_form`, `xss_probe`, `idor_probe`
//! - audit: `header_check`

mod crawl_site;
mod find_forms;
mod get_form_fields;
mod header_check;
mod idor_probe;
mod submit_form;
mod xss_probe;

pub use crawl_site::{url_pattern, CrawlReport, CrawlSiteTool};
pub use find_forms::FindFormsTool;
pub use get_form_fields::GetFormFieldsTool;
pub use header_check::HeaderCheckTool;
pub use idor_probe::IdorProbeTool;
pub use submit_form::SubmitFormTool;
pub use xss_probe::XssProbeTool;

use crate::browser::html::extract_forms;
use crate::browser::{BrowserSession, Form, Page};
use crate::tools::types::{ToolContext, ToolResult};
use url::Url;

/// Launch a session and load `url`
pub(crate) async fn open_page(
    context: &ToolContext,
    url: &Url,
) -> Result<(Box<dyn BrowserSession>, Page), ToolResult> {
    let mut session = context
        .launcher
        .launch()
        .await
        .map_err(|e| ToolResult::error(format!("Failed to start browser: {}", e)))?;
    let page = session
        .goto(url.as_str())
        .await
        .map_err(|e| ToolResult::error(format!("An error occurred: {}", e)))?;
    Ok((session, page))
}

/// Pick form `number` (1-based) out of the page's forms
pub(crate) fn select_form(forms: Vec<Form>, number: usize, url: &str) -> Result<Form, ToolResult> {
    let total = forms.len();
    if total == 0 {
        return Err(ToolResult::error(format!("No forms were found on {}.", url)));
    }
    forms
        .into_iter()
        .find(|f| f.number == number)
        .ok_or_else(|| {
            ToolResult::error(format!(
                "Form #{} does not exist on {}. The page has {} form{} (numbered 1 to {}).",
                number,
                url,
                total,
                if total == 1 { "" } else { "s" },
                total
            ))
        })
}

/// Launch a session, load `url` and pick one of its forms
pub(crate) async fn open_form(
    context: &ToolContext,
    url: &Url,
    number: usize,
) -> Result<(Box<dyn BrowserSession>, Page, Form), ToolResult> {
    let (session, page) = open_page(context, url).await?;
    let form = select_form(extract_forms(&page.url, &page.html), number, url.as_str())?;
    Ok((session, page, form))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::browser::fake::FakeSite;
    use crate::config::CrawlLimits;
    use crate::tools::types::ToolContext;

    pub fn context_for(site: &FakeSite) -> ToolContext {
        ToolContext::new(site.launcher(), CrawlLimits::default())
    }
}
