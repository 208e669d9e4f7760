//! Reflected XSS probe
//!
//! Each probe value carries a unique alphanumeric marker. When the full payload
//! comes back unchanged the input is reflected unescaped; when only the marker
//! survives the application encoded it.

use super::{open_page, select_form};
use crate::browser::html::extract_forms;
use crate::browser::{BrowserSession, Form};
use crate::tools::registry::Tool;
use crate::tools::types::{
    deserialize_usize_lenient, parse_params, parse_target_url, url_property, PropertySchema,
    ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use url::Url;

const MARKER_PLACEHOLDER: &str = "{marker}";

const DEFAULT_PAYLOADS: &[&str] = &[
    "<script>alert('{marker}')</script>",
    "\"><img src=x onerror=alert('{marker}')>",
    "'><svg/onload=alert('{marker}')>",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reflection {
    Unescaped,
    Encoded,
    NotReflected,
}

impl Reflection {
    fn label(&self) -> &'static str {
        match self {
            Reflection::Unescaped => "REFLECTED (unescaped)",
            Reflection::Encoded => "encoded",
            Reflection::NotReflected => "not reflected",
        }
    }
}

pub fn classify(html: &str, payload: &str, marker: &str) -> Reflection {
    if html.contains(payload) {
        Reflection::Unescaped
    } else if html.contains(marker) {
        Reflection::Encoded
    } else {
        Reflection::NotReflected
    }
}

/// Put `marker` into a payload template
fn arm(template: &str, marker: &str) -> String {
    if template.contains(MARKER_PLACEHOLDER) {
        template.replace(MARKER_PLACEHOLDER, marker)
    } else {
        format!("{}{}", marker, template)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ProbeOutcome {
    location: String,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reflection: Option<Reflection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct Prober<'a> {
    session: &'a mut dyn BrowserSession,
    marker_base: String,
    counter: usize,
    outcomes: Vec<ProbeOutcome>,
}

impl<'a> Prober<'a> {
    fn next_marker(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.marker_base, self.counter)
    }

    async fn probe_form(&mut self, form: &Form, templates: &[String]) {
        for field in form.injectable_fields() {
            for template in templates {
                let marker = self.next_marker();
                let payload = arm(template, &marker);
                let mut overrides = BTreeMap::new();
                overrides.insert(field.name.clone(), payload.clone());
                let submission = form.fill(&overrides);

                let location = format!("form #{} field '{}'", form.number, field.name);
                let outcome = match self.session.submit(&submission).await {
                    Ok(page) => ProbeOutcome {
                        reflection: Some(classify(&page.html, &payload, &marker)),
                        location,
                        payload,
                        error: None,
                    },
                    Err(e) => ProbeOutcome {
                        reflection: None,
                        location,
                        payload,
                        error: Some(e),
                    },
                };
                self.outcomes.push(outcome);
            }
        }
    }

    async fn probe_query(&mut self, url: &Url, templates: &[String]) {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        // A repeated key is tested once, with every occurrence replaced
        let mut seen = HashSet::new();
        let keys: Vec<&String> = pairs
            .iter()
            .map(|(k, _)| k)
            .filter(|k| seen.insert(*k))
            .collect();

        for key in keys {
            for template in templates {
                let marker = self.next_marker();
                let payload = arm(template, &marker);
                let mut target = url.clone();
                {
                    let mut query = target.query_pairs_mut();
                    query.clear();
                    for (k, v) in &pairs {
                        query.append_pair(k, if k == key { &payload } else { v });
                    }
                }

                let location = format!("query parameter '{}'", key);
                let outcome = match self.session.goto(target.as_str()).await {
                    Ok(page) => ProbeOutcome {
                        reflection: Some(classify(&page.html, &payload, &marker)),
                        location,
                        payload,
                        error: None,
                    },
                    Err(e) => ProbeOutcome {
                        reflection: None,
                        location,
                        payload,
                        error: Some(e),
                    },
                };
                self.outcomes.push(outcome);
            }
        }
    }
}

pub struct XssProbeTool {
    definition: ToolDefinition,
}

impl XssProbeTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("url".to_string(), url_property());
        properties.insert(
            "form_number".to_string(),
            PropertySchema::integer("Probe only this form (1-based). All forms are probed when omitted."),
        );
        properties.insert(
            "payloads".to_string(),
            PropertySchema::array_of_strings("Custom payloads. Use {marker} where a unique marker should go."),
        );

        XssProbeTool {
            definition: ToolDefinition {
                name: "xss_probe".to_string(),
                description: "Test a page for reflected cross-site scripting. Injects marker-tagged payloads into every text field of its forms and into its query parameters, then reports whether each payload came back unescaped, encoded or not at all.".to_string(),
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

impl Default for XssProbeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct XssProbeParams {
    url: String,
    #[serde(default, deserialize_with = "deserialize_usize_lenient")]
    form_number: Option<usize>,
    #[serde(default)]
    payloads: Vec<String>,
}

#[async_trait]
impl Tool for XssProbeTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: XssProbeParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let url = match parse_target_url(&params.url) {
            Ok(u) => u,
            Err(e) => return e,
        };

        let templates: Vec<String> = if params.payloads.is_empty() {
            DEFAULT_PAYLOADS.iter().map(|p| p.to_string()).collect()
        } else {
            params.payloads
        };

        let (mut session, page) = match open_page(context, &url).await {
            Ok(loaded) => loaded,
            Err(e) => return e,
        };

        let all_forms = extract_forms(&page.url, &page.html);
        let forms = match params.form_number {
            Some(number) => match select_form(all_forms, number, url.as_str()) {
                Ok(form) => vec![form],
                Err(e) => return e,
            },
            None => all_forms,
        };

        let mut prober = Prober {
            session: session.as_mut(),
            marker_base: format!("apx{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            counter: 0,
            outcomes: Vec::new(),
        };
        for form in &forms {
            prober.probe_form(form, &templates).await;
        }
        if params.form_number.is_none() {
            prober.probe_query(&url, &templates).await;
        }
        let outcomes = prober.outcomes;

        if outcomes.is_empty() {
            return ToolResult::success(format!(
                "Nothing to probe on {}: no text fields or query parameters were found.",
                url
            ));
        }

        let suspected: Vec<&ProbeOutcome> = outcomes
            .iter()
            .filter(|o| o.reflection == Some(Reflection::Unescaped))
            .collect();
        context.progress(format!(
            "XSS probe of {}: {} suspected of {} probes",
            url,
            suspected.len(),
            outcomes.len()
        ));

        let mut out = format!(
            "XSS probe of {}: {} probes sent, {} suspected reflected XSS.\n",
            url,
            outcomes.len(),
            suspected.len()
        );
        for outcome in &outcomes {
            let verdict = match (&outcome.reflection, &outcome.error) {
                (Some(r), _) => r.label().to_string(),
                (None, Some(e)) => format!("error: {}", e),
                (None, None) => "unknown".to_string(),
            };
            out.push_str(&format!(
                "- {} payload {} -> {}\n",
                outcome.location, outcome.payload, verdict
            ));
        }
        if !suspected.is_empty() {
            let mut locations: Vec<&str> = suspected.iter().map(|o| o.location.as_str()).collect();
            locations.dedup();
            out.push_str(&format!("Suspected vulnerable inputs: {}\n", locations.join(", ")));
        }

        ToolResult::success(out).with_metadata(json!({
            "url": url.as_str(),
            "probes": outcomes.len(),
            "suspected": suspected.len(),
            "outcomes": outcomes,
        }))
    }
}
