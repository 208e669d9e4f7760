//! Breadth-first same-origin crawler
//!
//! Every normalized URL is fetched at most once. URLs are grouped by pattern
//! (numeric ids, UUIDs and hashes collapsed, query keys sorted) so that a
//! catalogue of thousands of `/product/{n}` pages costs only a few fetches.

use crate::browser::html::{extract_forms, extract_links, page_title};
use crate::browser::BrowserSession;
use crate::config::CrawlLimits;
use crate::tools::registry::Tool;
use crate::tools::types::{
    deserialize_usize_lenient, parse_params, parse_target_url, url_property, PropertySchema,
    ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use url::Url;

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});
static HASH_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[0-9a-f]{16,}$").unwrap());
static LOGOUT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(log[-_]?out|sign[-_]?out|logoff)").unwrap());

const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "bmp", "woff", "woff2",
    "ttf", "eot", "otf", "pdf", "zip", "gz", "tar", "mp3", "mp4", "webm", "avi", "mov",
];

/// Pattern key for a URL: host, path with variable segments collapsed, sorted query keys
pub fn url_pattern(url: &Url) -> String {
    let path: Vec<&str> = url
        .path_segments()
        .map(|segments| {
            segments
                .map(|s| {
                    if NUMERIC_SEGMENT.is_match(s) {
                        "{n}"
                    } else if UUID_SEGMENT.is_match(s) {
                        "{uuid}"
                    } else if HASH_SEGMENT.is_match(s) {
                        "{hash}"
                    } else {
                        s
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let keys: BTreeSet<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();

    let mut pattern = format!("{}/{}", url.host_str().unwrap_or(""), path.join("/"));
    if !keys.is_empty() {
        pattern.push('?');
        pattern.push_str(&keys.into_iter().collect::<Vec<_>>().join("&"));
    }
    pattern
}

fn is_static_asset(url: &Url) -> bool {
    url.path()
        .rsplit('/')
        .next()
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| STATIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_logout(url: &Url) -> bool {
    LOGOUT_PATH.is_match(url.path())
}

fn normalize(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawledPage {
    pub url: String,
    pub depth: usize,
    pub status: u16,
    pub title: Option<String>,
    pub forms: usize,
    pub links: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlError {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub pages: Vec<CrawledPage>,
    pub errors: Vec<CrawlError>,
    /// URLs dropped because their pattern was already covered enough
    pub skipped_by_pattern: usize,
    /// True when the crawl stopped at the page limit with URLs still queued
    pub truncated: bool,
}

impl CrawlReport {
    fn attempts(&self) -> usize {
        self.pages.len() + self.errors.len()
    }

    pub fn summary(&self, start: &str, limits: &CrawlLimits) -> String {
        let mut out = format!(
            "Crawled {} pages starting at {} (max_pages {}, max_depth {}).\n",
            self.pages.len(),
            start,
            limits.max_pages,
            limits.max_depth
        );
        for page in &self.pages {
            out.push_str(&format!(
                "- [{}] {} {}(depth {}, {} form{})\n",
                page.status,
                page.url,
                page.title
                    .as_ref()
                    .map(|t| format!("\"{}\" ", t))
                    .unwrap_or_default(),
                page.depth,
                page.forms,
                if page.forms == 1 { "" } else { "s" }
            ));
        }
        let total_forms: usize = self.pages.iter().map(|p| p.forms).sum();
        out.push_str(&format!("Total forms seen: {}\n", total_forms));
        if self.skipped_by_pattern > 0 {
            out.push_str(&format!(
                "Skipped {} URLs whose pattern was already covered.\n",
                self.skipped_by_pattern
            ));
        }
        if self.truncated {
            out.push_str("Stopped at the page limit with URLs still queued.\n");
        }
        if !self.errors.is_empty() {
            out.push_str(&format!("Errors ({}):\n", self.errors.len()));
            for error in &self.errors {
                out.push_str(&format!("- {}: {}\n", error.url, error.error));
            }
        }
        out
    }
}

/// Breadth-first crawl of `start`'s origin within `limits`
pub async fn crawl(
    session: &mut dyn BrowserSession,
    start: &Url,
    limits: &CrawlLimits,
    context: &ToolContext,
) -> CrawlReport {
    let origin = start.origin();
    let mut report = CrawlReport::default();
    let mut queue: VecDeque<(Url, usize)> = VecDeque::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pattern_counts: HashMap<String, usize> = HashMap::new();

    let start = normalize(start.clone());
    seen.insert(start.to_string());
    queue.push_back((start, 0));

    while let Some((url, depth)) = queue.pop_front() {
        if report.attempts() >= limits.max_pages {
            report.truncated = true;
            log::info!("[TOOL] crawl_site reached max pages ({})", limits.max_pages);
            break;
        }

        let count = pattern_counts.entry(url_pattern(&url)).or_insert(0);
        if *count >= limits.max_per_pattern {
            report.skipped_by_pattern += 1;
            continue;
        }
        *count += 1;

        let page = match session.goto(url.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                log::warn!("[TOOL] crawl_site failed to load {}: {}", url, e);
                report.errors.push(CrawlError {
                    url: url.to_string(),
                    error: e,
                });
                continue;
            }
        };

        // A redirect may land on a page that is already queued or visited
        let final_url = Url::parse(&page.url)
            .map(normalize)
            .unwrap_or_else(|_| url.clone());
        if final_url != url && !seen.insert(final_url.to_string()) {
            log::debug!("[TOOL] crawl_site: {} redirected to already seen {}", url, final_url);
            continue;
        }
        context.progress(format!("Visited {} [{}]", page.url, page.status));

        let (title, forms, links) = (
            page_title(&page.html),
            extract_forms(&page.url, &page.html).len(),
            extract_links(&page.url, &page.html),
        );

        report.pages.push(CrawledPage {
            url: page.url.clone(),
            depth,
            status: page.status,
            title,
            forms,
            links: links.len(),
        });

        if depth >= limits.max_depth || final_url.origin() != origin {
            continue;
        }

        for link in links {
            let Ok(link) = Url::parse(&link) else {
                continue;
            };
            if link.origin() != origin || is_static_asset(&link) || is_logout(&link) {
                continue;
            }
            let link = normalize(link);
            if seen.insert(link.to_string()) {
                queue.push_back((link, depth + 1));
            }
        }
    }

    report
}

/// Crawl tool
pub struct CrawlSiteTool {
    definition: ToolDefinition,
}

impl CrawlSiteTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("url".to_string(), url_property());
        properties.insert(
            "max_pages".to_string(),
            PropertySchema::integer("Maximum number of pages to fetch (defaults to the server limit)"),
        );
        properties.insert(
            "max_depth".to_string(),
            PropertySchema::integer("Maximum link depth from the start URL (defaults to the server limit)"),
        );

        CrawlSiteTool {
            definition: ToolDefinition {
                name: "crawl_site".to_string(),
                description: "Crawl a website breadth-first from a start URL, staying on the same origin. Lists every visited page with its status, title and number of forms.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["url".to_string()],
                },
                group: ToolGroup::Recon,
            },
        }
    }
}

impl Default for CrawlSiteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct CrawlSiteParams {
    url: String,
    #[serde(default, deserialize_with = "deserialize_usize_lenient")]
    max_pages: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_usize_lenient")]
    max_depth: Option<usize>,
}

#[async_trait]
impl Tool for CrawlSiteTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: CrawlSiteParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let start = match parse_target_url(&params.url) {
            Ok(u) => u,
            Err(e) => return e,
        };

        // Callers may narrow the configured limits but never widen them
        let limits = CrawlLimits {
            max_pages: params
                .max_pages
                .map(|n| n.min(context.crawl.max_pages).max(1))
                .unwrap_or(context.crawl.max_pages),
            max_depth: params
                .max_depth
                .map(|d| d.min(context.crawl.max_depth))
                .unwrap_or(context.crawl.max_depth),
            max_per_pattern: context.crawl.max_per_pattern,
        };

        let mut session = match context.launcher.launch().await {
            Ok(s) => s,
            Err(e) => return ToolResult::error(format!("Failed to start browser: {}", e)),
        };

        log::info!("[TOOL] crawl_site starting at {} ({:?})", start, limits);
        let report = crawl(session.as_mut(), &start, &limits, context).await;

        if report.pages.is_empty() {
            let reason = report
                .errors
                .first()
                .map(|e| e.error.clone())
                .unwrap_or_else(|| "no pages could be loaded".to_string());
            return ToolResult::error(format!("An error occurred: {}", reason));
        }

        let summary = report.summary(start.as_str(), &limits);
        let metadata = serde_json::to_value(&report).unwrap_or_else(|_| json!({}));
        ToolResult::success(summary).with_metadata(metadata)
    }
}
