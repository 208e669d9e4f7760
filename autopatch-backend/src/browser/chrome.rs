//! Headless Chromium backend
//!
//! `headless_chrome` is synchronous, so every call runs on the blocking pool.
//! The DevTools protocol used here does not expose the document's response
//! headers; pages are reported with status 200 and no headers.

use super::{BrowserLauncher, BrowserSession, FormSubmission, HttpMethod, Page};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;

pub struct ChromeBrowser {
    timeout: Duration,
}

impl ChromeBrowser {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeBrowser {
    fn name(&self) -> &'static str {
        "chrome"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, String> {
        let timeout = self.timeout;
        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(true)
                .idle_browser_timeout(timeout)
                .build()
                .map_err(|e| format!("Browser launch options error: {}", e))?;
            let browser =
                Browser::new(options).map_err(|e| format!("Failed to launch Chromium: {}", e))?;
            let tab = browser
                .new_tab()
                .map_err(|e| format!("Failed to create tab: {}", e))?;
            tab.set_default_timeout(timeout);
            Ok::<_, String>((browser, tab))
        })
        .await
        .map_err(|e| format!("Browser task panicked: {}", e))??;

        Ok(Box::new(ChromeSession {
            _browser: browser,
            tab,
        }))
    }
}

pub struct ChromeSession {
    // Dropping the browser closes Chromium
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    async fn run<F>(&self, action: F) -> Result<Page, String>
    where
        F: FnOnce(&Tab) -> Result<(), String> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || {
            action(&tab)?;
            tab.wait_until_navigated()
                .map_err(|e| format!("Navigation timeout: {}", e))?;
            let html = tab
                .get_content()
                .map_err(|e| format!("Failed to read page content: {}", e))?;
            Ok(Page {
                url: tab.get_url(),
                status: 200,
                headers: Vec::new(),
                html,
            })
        })
        .await
        .map_err(|e| format!("Browser task panicked: {}", e))?
    }
}

/// Script that builds and submits a POST form with the given fields
fn post_script(submission: &FormSubmission) -> Result<String, String> {
    let action = serde_json::to_string(&submission.action).map_err(|e| e.to_string())?;
    let fields = serde_json::to_string(&submission.fields).map_err(|e| e.to_string())?;
    Ok(format!(
        r#"(function() {{
            const form = document.createElement('form');
            form.method = 'POST';
            form.action = {action};
            for (const [name, value] of {fields}) {{
                const input = document.createElement('input');
                input.type = 'hidden';
                input.name = name;
                input.value = value;
                form.appendChild(input);
            }}
            document.body.appendChild(form);
            HTMLFormElement.prototype.submit.call(form);
            return true;
        }})()"#
    ))
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<Page, String> {
        log::debug!("[BROWSER] chrome navigate {}", url);
        let target = url.to_string();
        self.run(move |tab| {
            tab.navigate_to(&target)
                .map(|_| ())
                .map_err(|e| format!("Failed to load {}: {}", target, e))
        })
        .await
    }

    async fn submit(&mut self, submission: &FormSubmission) -> Result<Page, String> {
        match submission.method {
            HttpMethod::Get => {
                let url = submission.get_url()?;
                self.goto(&url).await
            }
            HttpMethod::Post => {
                log::debug!("[BROWSER] chrome POST {}", submission.action);
                let script = post_script(submission)?;
                let action = submission.action.clone();
                self.run(move |tab| {
                    tab.evaluate(&script, false)
                        .map(|_| ())
                        .map_err(|e| format!("Failed to submit form to {}: {}", action, e))
                })
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_script_escapes_values() {
        let script = post_script(&FormSubmission {
            action: "http://a.test/login".to_string(),
            method: HttpMethod::Post,
            fields: vec![("q".to_string(), "'\"</script>".to_string())],
        })
        .unwrap();
        assert!(script.contains(r#"form.action = "http://a.test/login";"#));
        assert!(script.contains(r#"[["q","'\"</script>"]]"#));
    }
}
