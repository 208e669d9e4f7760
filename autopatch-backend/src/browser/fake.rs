//! In-memory website for tests

use super::{BrowserLauncher, BrowserSession, FormSubmission, HttpMethod, Page};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How an echo endpoint reflects submitted values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMode {
    Raw,
    Escaped,
}

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, Page>,
    errors: HashSet<String>,
    redirects: HashMap<String, String>,
    echoes: HashMap<String, EchoMode>,
    requests: Vec<String>,
    submissions: Vec<FormSubmission>,
    launches: usize,
}

#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

fn normalize(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn without_query(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut u) => {
            u.set_query(None);
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn echo_page(url: &str, mode: EchoMode, fields: &[(String, String)]) -> Page {
    let body: Vec<String> = fields
        .iter()
        .map(|(name, value)| {
            let value = match mode {
                EchoMode::Raw => value.clone(),
                EchoMode::Escaped => escape(value),
            };
            format!("<p>{}: {}</p>", escape(name), value)
        })
        .collect();
    Page {
        url: url.to_string(),
        status: 200,
        headers: vec![("content-type".to_string(), "text/html".to_string())],
        html: format!("<html><body><h1>Results</h1>{}</body></html>", body.join("")),
    }
}

fn not_found(url: &str) -> Page {
    Page {
        url: url.to_string(),
        status: 404,
        headers: vec![("content-type".to_string(), "text/html".to_string())],
        html: "<html><body>Not Found</body></html>".to_string(),
    }
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` with status 200 at `url`
    pub fn page(&self, url: &str, html: &str) -> &Self {
        self.page_with(
            url,
            200,
            vec![("content-type".to_string(), "text/html".to_string())],
            html,
        )
    }

    pub fn page_with(
        &self,
        url: &str,
        status: u16,
        headers: Vec<(String, String)>,
        html: &str,
    ) -> &Self {
        let url = normalize(url);
        self.state.lock().pages.insert(
            url.clone(),
            Page {
                url,
                status,
                headers: headers
                    .into_iter()
                    .map(|(k, v)| (k.to_lowercase(), v))
                    .collect(),
                html: html.to_string(),
            },
        );
        self
    }

    /// Loading `url` fails with a network error
    pub fn fail(&self, url: &str) -> &Self {
        self.state.lock().errors.insert(normalize(url));
        self
    }

    /// GET `from` is answered with a redirect to `to`
    pub fn redirect(&self, from: &str, to: &str) -> &Self {
        self.state.lock().redirects.insert(normalize(from), normalize(to));
        self
    }

    /// `url` (any query) echoes submitted or query values back
    pub fn echo(&self, url: &str, mode: EchoMode) -> &Self {
        self.state.lock().echoes.insert(without_query(url), mode);
        self
    }

    /// "METHOD url" for every request served
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    pub fn submissions(&self) -> Vec<FormSubmission> {
        self.state.lock().submissions.clone()
    }

    pub fn launches(&self) -> usize {
        self.state.lock().launches
    }

    pub fn launcher(&self) -> Arc<dyn BrowserLauncher> {
        Arc::new(self.clone())
    }

    fn serve_get(&self, url: &str) -> Result<Page, String> {
        let mut url = normalize(url);
        let mut state = self.state.lock();
        state.requests.push(format!("GET {}", url));

        let mut hops = 0;
        while let Some(target) = state.redirects.get(&url).cloned() {
            hops += 1;
            if hops > 10 {
                return Err(format!("Failed to load {}: too many redirects", url));
            }
            url = target;
            state.requests.push(format!("GET {}", url));
        }

        if state.errors.contains(&url) {
            return Err(format!("Failed to load {}: connection refused", url));
        }
        if let Some(page) = state.pages.get(&url) {
            return Ok(page.clone());
        }
        if let Some(mode) = state.echoes.get(&without_query(&url)).copied() {
            let fields: Vec<(String, String)> = url::Url::parse(&url)
                .map(|u| u.query_pairs().into_owned().collect())
                .unwrap_or_default();
            return Ok(echo_page(&url, mode, &fields));
        }
        Ok(not_found(&url))
    }
}

#[async_trait]
impl BrowserLauncher for FakeSite {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, String> {
        self.state.lock().launches += 1;
        Ok(Box::new(FakeSession { site: self.clone() }))
    }
}

struct FakeSession {
    site: FakeSite,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str) -> Result<Page, String> {
        self.site.serve_get(url)
    }

    async fn submit(&mut self, submission: &FormSubmission) -> Result<Page, String> {
        self.site.state.lock().submissions.push(submission.clone());
        match submission.method {
            HttpMethod::Get => self.site.serve_get(&submission.get_url()?),
            HttpMethod::Post => {
                let action = normalize(&submission.action);
                let mut state = self.site.state.lock();
                state.requests.push(format!("POST {}", action));
                if state.errors.contains(&action) {
                    return Err(format!("Failed to submit form to {}: connection refused", action));
                }
                if let Some(mode) = state.echoes.get(&without_query(&action)).copied() {
                    return Ok(echo_page(&action, mode, &submission.fields));
                }
                Ok(state
                    .pages
                    .get(&action)
                    .cloned()
                    .unwrap_or_else(|| not_found(&action)))
            }
        }
    }
}
