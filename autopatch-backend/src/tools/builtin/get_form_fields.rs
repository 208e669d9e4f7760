use super::open_form;
use crate::browser::{FieldKind, Form};
use crate::tools::registry::Tool;
use crate::tools::types::{
    deserialize_usize_lenient, parse_params, parse_target_url, url_property, PropertySchema,
    ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub struct GetFormFieldsTool {
    definition: ToolDefinition,
}

impl GetFormFieldsTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("url".to_string(), url_property());
        properties.insert(
            "form_number".to_string(),
            PropertySchema::integer("1-based form number as reported by find_forms").with_default(json!(1)),
        );

        GetFormFieldsTool {
            definition: ToolDefinition {
                name: "get_form_fields".to_string(),
                description: "List the fields of one form on a page: name, type, whether it is required, current value and select options.".to_string(),
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

impl Default for GetFormFieldsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct GetFormFieldsParams {
    url: String,
    #[serde(default, deserialize_with = "deserialize_usize_lenient")]
    form_number: Option<usize>,
}

fn describe_fields(form: &Form) -> String {
    let mut out = format!(
        "Form #{} submits via {} to {}\nFields:\n",
        form.number, form.method, form.action
    );
    let mut listed = 0;
    for field in &form.fields {
        if field.name.is_empty() {
            continue;
        }
        listed += 1;
        out.push_str(&format!("- {} ({})", field.name, field.kind.as_str()));
        if field.required {
            out.push_str(" required");
        }
        match field.kind {
            FieldKind::Select => {
                out.push_str(&format!(" options: [{}]", field.options.join(", ")));
            }
            FieldKind::Checkbox | FieldKind::Radio if field.checked => out.push_str(" checked"),
            _ => {}
        }
        if let Some(value) = field.value.as_deref().filter(|v| !v.is_empty()) {
            out.push_str(&format!(" value=\"{}\"", value));
        }
        out.push('\n');
    }
    if listed == 0 {
        out.push_str("(no named fields)\n");
    }
    out
}

#[async_trait]
impl Tool for GetFormFieldsTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: GetFormFieldsParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let url = match parse_target_url(&params.url) {
            Ok(u) => u,
            Err(e) => return e,
        };

        let (_session, _page, form) =
            match open_form(context, &url, params.form_number.unwrap_or(1)).await {
                Ok(loaded) => loaded,
                Err(e) => return e,
            };

        let metadata = json!({
            "url": url.as_str(),
            "form": serde_json::to_value(&form).unwrap_or(Value::Null),
        });
        ToolResult::success(describe_fields(&form)).with_metadata(metadata)
    }
}
