use super::{BrowserLauncher, BrowserSession, FormSubmission, HttpMethod, Page};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; Autopatch/0.1; +security-scan)";
const MAX_REDIRECTS: usize = 5;

/// Plain HTTP backend. Each session gets its own client and cookie jar.
pub struct HttpBrowser {
    timeout: Duration,
}

impl HttpBrowser {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl BrowserLauncher for HttpBrowser {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, String> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Box::new(HttpSession { client }))
    }
}

pub struct HttpSession {
    client: Client,
}

impl HttpSession {
    async fn into_page(response: reqwest::Response) -> Result<Page, String> {
        let url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let html = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response body from {}: {}", url, e))?;

        Ok(Page {
            url,
            status,
            headers,
            html,
        })
    }
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn goto(&mut self, url: &str) -> Result<Page, String> {
        log::debug!("[BROWSER] GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Failed to load {}: {}", url, e))?;
        Self::into_page(response).await
    }

    async fn submit(&mut self, submission: &FormSubmission) -> Result<Page, String> {
        let request = match submission.method {
            HttpMethod::Get => self.client.get(submission.get_url()?),
            HttpMethod::Post => self.client.post(&submission.action).form(&submission.fields),
        };
        log::debug!("[BROWSER] {} {}", submission.method, submission.action);

        let response = request
            .send()
            .await
            .map_err(|e| format!("Failed to submit form to {}: {}", submission.action, e))?;
        Self::into_page(response).await
    }
}
