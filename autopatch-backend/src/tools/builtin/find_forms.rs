use super::open_page;
use crate::browser::html::extract_forms;
use crate::tools::registry::Tool;
use crate::tools::types::{
    parse_params, parse_target_url, url_property, ToolContext, ToolDefinition, ToolGroup,
    ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Lists every form on a single page with its raw HTML
pub struct FindFormsTool {
    definition: ToolDefinition,
}

impl FindFormsTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("url".to_string(), url_property());

        FindFormsTool {
            definition: ToolDefinition {
                name: "find_forms".to_string(),
                description: "Find all forms on a single web page. Returns each form's number, method, action URL and inner HTML.".to_string(),
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

impl Default for FindFormsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct FindFormsParams {
    url: String,
}

#[async_trait]
impl Tool for FindFormsTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: FindFormsParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let url = match parse_target_url(&params.url) {
            Ok(u) => u,
            Err(e) => return e,
        };

        let (_session, page) = match open_page(context, &url).await {
            Ok(loaded) => loaded,
            Err(e) => return e,
        };

        let forms = extract_forms(&page.url, &page.html);
        if forms.is_empty() {
            return ToolResult::success(format!("No forms were found on {}.", url))
                .with_metadata(json!({ "url": url.as_str(), "forms": 0 }));
        }

        let details: Vec<String> = forms
            .iter()
            .map(|form| {
                format!(
                    "Form #{} ({} {}):\n{}\n",
                    form.number,
                    form.method,
                    form.action,
                    form.inner_html.trim()
                )
            })
            .collect();

        ToolResult::success(format!(
            "Found {} forms on {}:\n{}",
            forms.len(),
            url,
            details.join("")
        ))
        .with_metadata(json!({
            "url": url.as_str(),
            "final_url": page.url,
            "forms": forms.len(),
        }))
    }
}
