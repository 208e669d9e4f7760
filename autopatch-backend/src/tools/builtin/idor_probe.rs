//! Insecure direct object reference probe
//!
//! Numeric identifiers in the URL are swapped for neighbouring values. A
//! neighbour that answers 2xx with content differing from both the original
//! object and an implausible control id is reported as accessible.

use super::open_page;
use crate::browser::html::visible_text;
use crate::browser::BrowserSession;
use crate::tools::registry::Tool;
use crate::tools::types::{
    deserialize_usize_lenient, parse_params, parse_target_url, url_property, PropertySchema,
    ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use url::Url;

const CONTROL_ID: u64 = 987_654_321;
const DEFAULT_SPAN: usize = 2;
const MAX_SPAN: usize = 5;
const COMPARE_CHARS: usize = 20_000;

/// Where a numeric identifier sits in the URL
#[derive(Debug, Clone, PartialEq, Eq)]
enum IdLocation {
    Query(String),
    PathSegment(usize),
}

#[derive(Debug, Clone)]
struct Identifier {
    location: IdLocation,
    value: u64,
}

impl Identifier {
    fn describe(&self) -> String {
        match &self.location {
            IdLocation::Query(name) => format!("query parameter '{}'", name),
            IdLocation::PathSegment(i) => format!("path segment {}", i + 1),
        }
    }

    /// `url` with this identifier replaced by `value`
    fn with_value(&self, url: &Url, value: u64) -> Url {
        let mut target = url.clone();
        match &self.location {
            IdLocation::Query(name) => {
                let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
                let mut query = target.query_pairs_mut();
                query.clear();
                for (k, v) in &pairs {
                    if k == name {
                        query.append_pair(k, &value.to_string());
                    } else {
                        query.append_pair(k, v);
                    }
                }
            }
            IdLocation::PathSegment(index) => {
                let segments: Vec<String> = url
                    .path_segments()
                    .map(|s| s.map(|p| p.to_string()).collect())
                    .unwrap_or_default();
                let path: Vec<String> = segments
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| if i == *index { value.to_string() } else { s })
                    .collect();
                target.set_path(&format!("/{}", path.join("/")));
            }
        }
        target
    }
}

fn find_identifiers(url: &Url, only_param: Option<&str>) -> Vec<Identifier> {
    let mut ids: Vec<Identifier> = Vec::new();

    for (name, value) in url.query_pairs() {
        if only_param.is_some_and(|p| p != name) {
            continue;
        }
        if ids.iter().any(|i| i.location == IdLocation::Query(name.to_string())) {
            continue;
        }
        if let Ok(value) = value.parse::<u64>() {
            ids.push(Identifier {
                location: IdLocation::Query(name.into_owned()),
                value,
            });
        }
    }

    if only_param.is_none() {
        if let Some(segments) = url.path_segments() {
            for (i, segment) in segments.enumerate() {
                if let Ok(value) = segment.parse::<u64>() {
                    ids.push(Identifier {
                        location: IdLocation::PathSegment(i),
                        value,
                    });
                }
            }
        }
    }
    ids
}

#[derive(Debug, Clone, Serialize)]
struct Fetch {
    id: u64,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip)]
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    accessible: bool,
}

impl Fetch {
    fn ok(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

async fn fetch(session: &mut dyn BrowserSession, id: u64, url: &Url) -> Fetch {
    match session.goto(url.as_str()).await {
        Ok(page) => Fetch {
            id,
            url: page.url.clone(),
            status: Some(page.status),
            text: visible_text(&page.html, COMPARE_CHARS),
            error: None,
            accessible: false,
        },
        Err(e) => Fetch {
            id,
            url: url.to_string(),
            status: None,
            text: String::new(),
            error: Some(e),
            accessible: false,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Verdict {
    Suspected,
    Inconclusive,
    NotAccessible,
}

#[derive(Debug, Clone, Serialize)]
struct IdentifierReport {
    location: String,
    value: u64,
    control: Fetch,
    neighbours: Vec<Fetch>,
    verdict: Verdict,
}

/// Compare neighbours against the baseline and the control response
fn judge(baseline_text: &str, control: &Fetch, neighbours: &mut [Fetch]) -> Verdict {
    let reachable: Vec<usize> = (0..neighbours.len()).filter(|&i| neighbours[i].ok()).collect();

    if control.ok() && !reachable.is_empty() && reachable.iter().all(|&i| neighbours[i].text == control.text) {
        return Verdict::Inconclusive;
    }

    let mut any = false;
    for i in reachable {
        let n = &mut neighbours[i];
        let differs_from_control = !control.ok() || n.text != control.text;
        if differs_from_control && n.text != baseline_text {
            n.accessible = true;
            any = true;
        }
    }
    if any {
        Verdict::Suspected
    } else {
        Verdict::NotAccessible
    }
}

fn neighbour_ids(value: u64, span: usize) -> Vec<u64> {
    let span = span as u64;
    (value.saturating_sub(span)..=value.saturating_add(span))
        .filter(|&n| n != value && n != CONTROL_ID)
        .collect()
}

pub struct IdorProbeTool {
    definition: ToolDefinition,
}

impl IdorProbeTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("url".to_string(), url_property());
        properties.insert(
            "param".to_string(),
            PropertySchema::string("Only test this query parameter. By default every numeric query parameter and path segment is tested."),
        );
        properties.insert(
            "span".to_string(),
            PropertySchema::integer("How many ids on each side of the original to try (1-5)").with_default(json!(DEFAULT_SPAN)),
        );

        IdorProbeTool {
            definition: ToolDefinition {
                name: "idor_probe".to_string(),
                description: "Test a URL containing numeric object ids for insecure direct object references. Requests neighbouring ids and a control id and reports ids that return other objects' content.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["url".to_string()],
                },
                group: ToolGroup::Probe,
            },
        }
    }
}

impl Default for IdorProbeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct IdorProbeParams {
    url: String,
    param: Option<String>,
    #[serde(default, deserialize_with = "deserialize_usize_lenient")]
    span: Option<usize>,
}

#[async_trait]
impl Tool for IdorProbeTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: IdorProbeParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let url = match parse_target_url(&params.url) {
            Ok(u) => u,
            Err(e) => return e,
        };
        let span = params.span.unwrap_or(DEFAULT_SPAN).clamp(1, MAX_SPAN);

        let identifiers = find_identifiers(&url, params.param.as_deref());
        if identifiers.is_empty() {
            return match &params.param {
                Some(p) => ToolResult::error(format!(
                    "Query parameter '{}' is missing from {} or is not numeric.",
                    p, url
                )),
                None => ToolResult::success(format!(
                    "No numeric identifiers found in {}. Nothing to test.",
                    url
                )),
            };
        }

        let (mut session, baseline) = match open_page(context, &url).await {
            Ok(loaded) => loaded,
            Err(e) => return e,
        };
        let baseline_text = visible_text(&baseline.html, COMPARE_CHARS);

        let mut reports = Vec::new();
        for identifier in &identifiers {
            let control = fetch(
                session.as_mut(),
                CONTROL_ID,
                &identifier.with_value(&url, CONTROL_ID),
            )
            .await;
            let mut neighbours = Vec::new();
            for id in neighbour_ids(identifier.value, span) {
                neighbours.push(fetch(session.as_mut(), id, &identifier.with_value(&url, id)).await);
            }
            let verdict = judge(&baseline_text, &control, &mut neighbours);
            reports.push(IdentifierReport {
                location: identifier.describe(),
                value: identifier.value,
                control,
                neighbours,
                verdict,
            });
        }

        let suspected = reports.iter().filter(|r| r.verdict == Verdict::Suspected).count();
        context.progress(format!(
            "IDOR probe of {}: {} of {} identifiers suspected",
            url,
            suspected,
            reports.len()
        ));

        let mut out = format!(
            "IDOR probe of {} (baseline status {}): {} suspected IDOR across {} identifier{}.\n",
            url,
            baseline.status,
            suspected,
            reports.len(),
            if reports.len() == 1 { "" } else { "s" }
        );
        for report in &reports {
            out.push_str(&format!("{} = {}:\n", report.location, report.value));
            for n in &report.neighbours {
                out.push_str(&format!("- id {} -> {}\n", n.id, fetch_label(n)));
            }
            out.push_str(&format!("- id {} (control) -> {}\n", report.control.id, fetch_label(&report.control)));
            out.push_str(match report.verdict {
                Verdict::Suspected => "Verdict: other objects are accessible by changing the id (suspected IDOR).\n",
                Verdict::Inconclusive => "Verdict: inconclusive, the control id returns the same content as the neighbours.\n",
                Verdict::NotAccessible => "Verdict: no foreign objects were accessible.\n",
            });
        }

        ToolResult::success(out).with_metadata(json!({
            "url": url.as_str(),
            "suspected": suspected,
            "identifiers": reports,
        }))
    }
}

fn fetch_label(fetch: &Fetch) -> String {
    match (fetch.status, &fetch.error) {
        (Some(status), _) if fetch.accessible => format!("{}, distinct content: ACCESSIBLE", status),
        (Some(status), _) => status.to_string(),
        (None, Some(e)) => format!("error: {}", e),
        (None, None) => "no response".to_string(),
    }
}
