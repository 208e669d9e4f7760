use super::open_form;
use crate::browser::html::visible_text;
use crate::tools::registry::Tool;
use crate::tools::types::{
    deserialize_usize_lenient, parse_params, parse_target_url, url_property, PropertySchema,
    ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

const EXCERPT_CHARS: usize = 1500;

/// Shorter values match page text by accident too often to count as reflected
const MIN_REFLECTION_CHARS: usize = 3;

/// Fills and submits one form, reporting what came back
pub struct SubmitFormTool {
    definition: ToolDefinition,
}

impl SubmitFormTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("url".to_string(), url_property());
        properties.insert(
            "form_number".to_string(),
            PropertySchema::integer("1-based form number as reported by find_forms"),
        );
        properties.insert(
            "values".to_string(),
            PropertySchema::object("Field values keyed by field name. Fields left out keep their current value or get a harmless placeholder."),
        );

        SubmitFormTool {
            definition: ToolDefinition {
                name: "submit_form".to_string(),
                description: "Fill in and submit one form on a page. Reports the response status, final URL, which supplied values were reflected verbatim in the response, and an excerpt of the response text.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["url".to_string(), "form_number".to_string()],
                },
                group: ToolGroup::Probe,
            },
        }
    }
}

impl Default for SubmitFormTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct SubmitFormParams {
    url: String,
    #[serde(default, deserialize_with = "deserialize_usize_lenient")]
    form_number: Option<usize>,
    #[serde(default)]
    values: HashMap<String, Value>,
}

/// Accept numbers and booleans as field values
fn stringify_values(values: HashMap<String, Value>) -> BTreeMap<String, String> {
    values
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect()
}

#[async_trait]
impl Tool for SubmitFormTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: SubmitFormParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let url = match parse_target_url(&params.url) {
            Ok(u) => u,
            Err(e) => return e,
        };
        let Some(form_number) = params.form_number else {
            return ToolResult::error("Invalid parameters: missing field `form_number`");
        };
        let values = stringify_values(params.values);

        let (mut session, _page, form) = match open_form(context, &url, form_number).await {
            Ok(loaded) => loaded,
            Err(e) => return e,
        };

        let submission = form.fill(&values);
        log::info!(
            "[TOOL] submit_form #{} {} {} with {} fields",
            form.number,
            submission.method,
            submission.action,
            submission.fields.len()
        );

        let response = match session.submit(&submission).await {
            Ok(page) => page,
            Err(e) => return ToolResult::error(format!("An error occurred: {}", e)),
        };

        let (checked, too_short): (Vec<_>, Vec<_>) = values
            .iter()
            .partition(|(_, v)| v.chars().count() >= MIN_REFLECTION_CHARS);
        let reflected: Vec<&String> = checked
            .iter()
            .filter(|(_, v)| response.html.contains(v.as_str()))
            .map(|(k, _)| *k)
            .collect();

        let mut out = format!(
            "Submitted form #{} ({} {}) -> status {}, final URL {}\n",
            form.number, submission.method, submission.action, response.status, response.url
        );
        out.push_str("Sent: ");
        out.push_str(
            &submission
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push('\n');
        if values.is_empty() {
            out.push_str("No values were supplied; placeholders were used.\n");
        } else if reflected.is_empty() {
            out.push_str("None of the supplied values were reflected verbatim.\n");
        } else {
            out.push_str(&format!(
                "Reflected verbatim: {}\n",
                reflected.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
        if !too_short.is_empty() {
            out.push_str(&format!(
                "Not checked for reflection (shorter than {} characters): {}\n",
                MIN_REFLECTION_CHARS,
                too_short.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
        out.push_str("Response excerpt:\n");
        out.push_str(&visible_text(&response.html, EXCERPT_CHARS));

        ToolResult::success(out).with_metadata(json!({
            "url": url.as_str(),
            "action": submission.action,
            "method": submission.method.as_str(),
            "status": response.status,
            "final_url": response.url,
            "reflected": reflected,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{EchoMode, FakeSite};
    use crate::browser::HttpMethod;
    use crate::tools::builtin::test_support::context_for;

    fn site(mode: EchoMode) -> FakeSite {
        let site = FakeSite::new();
        site.page(
            "http://shop.test/contact",
            r#"<form action="/contact/send" method="post">
                 <input name="name"><input type="email" name="email">
                 <textarea name="message"></textarea>
               </form>"#,
        )
        .echo("http://shop.test/contact/send", mode);
        site
    }

    #[tokio::test]
    async fn test_submits_and_reports_reflection() {
        let site = site(EchoMode::Raw);
        let result = SubmitFormTool::new()
            .execute(
                json!({
                    "url": "http://shop.test/contact",
                    "form_number": 1,
                    "values": {"name": "<b>Mallory</b>", "message": 4242}
                }),
                &context_for(&site),
            )
            .await;

        assert!(result.success, "{}", result.content);
        assert!(result.content.contains("-> status 200"));
        assert!(result.content.contains("Reflected verbatim: message, name"));
        assert!(result.content.contains("Response excerpt:\nResults"));

        let submissions = site.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].method, HttpMethod::Post);
        assert_eq!(
            submissions[0].fields,
            vec![
                ("name".to_string(), "<b>Mallory</b>".to_string()),
                ("email".to_string(), "test@example.com".to_string()),
                ("message".to_string(), "4242".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_escaped_values_are_not_reported() {
        let site = site(EchoMode::Escaped);
        let result = SubmitFormTool::new()
            .execute(
                json!({"url": "http://shop.test/contact", "form_number": "1", "values": {"name": "<b>Mallory</b>"}}),
                &context_for(&site),
            )
            .await;
        assert!(result.success);
        assert!(result.content.contains("None of the supplied values were reflected verbatim."));
    }

    #[tokio::test]
    async fn test_form_number_is_required() {
        let definition = SubmitFormTool::new().definition();
        assert!(definition.input_schema.required.contains(&"form_number".to_string()));
        assert!(definition.input_schema.properties["form_number"].default.is_none());

        let site = site(EchoMode::Raw);
        let result = SubmitFormTool::new()
            .execute(json!({"url": "http://shop.test/contact"}), &context_for(&site))
            .await;
        assert!(!result.success);
        assert!(result.content.contains("form_number"));
        assert!(site.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_short_values_are_listed_as_unchecked() {
        let site = site(EchoMode::Raw);
        let result = SubmitFormTool::new()
            .execute(
                json!({"url": "http://shop.test/contact", "form_number": 1, "values": {"name": "Al", "message": "hello"}}),
                &context_for(&site),
            )
            .await;
        assert!(result.success, "{}", result.content);
        assert!(result.content.contains("Reflected verbatim: message\n"));
        assert!(result
            .content
            .contains("Not checked for reflection (shorter than 3 characters): name"));
    }
}
