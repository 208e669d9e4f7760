//! Browser sessions used by the scanning tools
//!
//! Every tool invocation launches a fresh session through a [`BrowserLauncher`],
//! performs its single task and drops the session. A session keeps cookies
//! between its own requests only.
//!
//! Backends:
//! - [`http::HttpBrowser`]: reqwest with a private cookie store (default)
//! - `chrome::ChromeBrowser`: headless Chromium (cargo feature `chrome`)

pub mod html;
pub mod http;

#[cfg(feature = "chrome")]
pub mod chrome;

#[cfg(test)]
pub mod fake;

pub use html::{FieldKind, Form, FormField};

use crate::config::{BrowserBackend, Config};
use async_trait::async_trait;
use std::sync::Arc;

/// A loaded page
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    /// Response headers, names lowercased, in arrival order
    pub headers: Vec<(String, String)>,
    pub html: String,
}

impl Page {
    /// First value of a header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeated header such as `set-cookie`
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .filter(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            other => Err(format!("Unsupported HTTP method '{}'", other)),
        }
    }
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filled-in form ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    /// Absolute action URL
    pub action: String,
    pub method: HttpMethod,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    /// The URL a GET submission navigates to
    pub fn get_url(&self) -> Result<String, String> {
        let mut url = url::Url::parse(&self.action)
            .map_err(|e| format!("Invalid form action '{}': {}", self.action, e))?;
        url.set_fragment(None);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (name, value) in &self.fields {
                pairs.append_pair(name, value);
            }
        }
        Ok(url.to_string())
    }
}

#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to a URL and return the loaded page
    async fn goto(&mut self, url: &str) -> Result<Page, String>;

    /// Submit a form and return the resulting page
    async fn submit(&mut self, submission: &FormSubmission) -> Result<Page, String>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a fresh, isolated session
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, String>;
}

/// Create the launcher selected by the configuration
pub fn create_launcher(config: &Config) -> Result<Arc<dyn BrowserLauncher>, String> {
    match config.browser_backend {
        BrowserBackend::Http => Ok(Arc::new(http::HttpBrowser::new(config.browser_timeout_secs))),
        BrowserBackend::Chrome => create_chrome_launcher(config),
    }
}

#[cfg(feature = "chrome")]
fn create_chrome_launcher(config: &Config) -> Result<Arc<dyn BrowserLauncher>, String> {
    Ok(Arc::new(chrome::ChromeBrowser::new(config.browser_timeout_secs)))
}

#[cfg(not(feature = "chrome"))]
fn create_chrome_launcher(_config: &Config) -> Result<Arc<dyn BrowserLauncher>, String> {
    Err("BROWSER_BACKEND=chrome requires building with the 'chrome' feature".to_string())
}
