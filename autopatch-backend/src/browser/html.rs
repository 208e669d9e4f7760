//! HTML analysis shared by the browser tools
//!
//! All parsing happens inside these synchronous helpers: `scraper::Html` is not
//! `Send` and must never be held across an `.await`.

use super::{FormSubmission, HttpMethod};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use url::Url;

/// Kind of a form control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Search,
    Email,
    Password,
    Number,
    Url,
    Tel,
    Date,
    Hidden,
    Checkbox,
    Radio,
    File,
    Submit,
    Button,
    Textarea,
    Select,
    Other,
}

impl FieldKind {
    fn from_input_type(type_attr: &str) -> Self {
        match type_attr.to_lowercase().as_str() {
            "" | "text" => FieldKind::Text,
            "search" => FieldKind::Search,
            "email" => FieldKind::Email,
            "password" => FieldKind::Password,
            "number" | "range" => FieldKind::Number,
            "url" => FieldKind::Url,
            "tel" => FieldKind::Tel,
            "date" | "datetime-local" | "month" | "week" | "time" => FieldKind::Date,
            "hidden" => FieldKind::Hidden,
            "checkbox" => FieldKind::Checkbox,
            "radio" => FieldKind::Radio,
            "file" => FieldKind::File,
            "submit" | "image" => FieldKind::Submit,
            "button" | "reset" => FieldKind::Button,
            _ => FieldKind::Other,
        }
    }

    /// Free-text controls where a user-supplied string lands unchanged
    pub fn is_text_like(&self) -> bool {
        matches!(
            self,
            FieldKind::Text
                | FieldKind::Search
                | FieldKind::Email
                | FieldKind::Url
                | FieldKind::Tel
                | FieldKind::Textarea
                | FieldKind::Other
        )
    }

    /// Value used when the caller does not supply one
    fn placeholder(&self) -> &'static str {
        match self {
            FieldKind::Email => "test@example.com",
            FieldKind::Password => "Password123!",
            FieldKind::Number => "1",
            FieldKind::Url => "https://example.com",
            FieldKind::Tel => "5555555555",
            FieldKind::Date => "2024-01-01",
            FieldKind::Hidden => "",
            FieldKind::Checkbox | FieldKind::Radio => "on",
            _ => "test",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Search => "search",
            FieldKind::Email => "email",
            FieldKind::Password => "password",
            FieldKind::Number => "number",
            FieldKind::Url => "url",
            FieldKind::Tel => "tel",
            FieldKind::Date => "date",
            FieldKind::Hidden => "hidden",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::File => "file",
            FieldKind::Submit => "submit",
            FieldKind::Button => "button",
            FieldKind::Textarea => "textarea",
            FieldKind::Select => "select",
            FieldKind::Other => "other",
        }
    }
}

/// A single control inside a form
#[derive(Debug, Clone, Serialize)]
pub struct FormField {
    pub name: String,
    pub kind: FieldKind,
    pub value: Option<String>,
    pub required: bool,
    pub checked: bool,
    /// Option values for `<select>`
    pub options: Vec<String>,
}

/// A form discovered on a page
#[derive(Debug, Clone, Serialize)]
pub struct Form {
    /// 1-based position on the page
    pub number: usize,
    /// Absolute action URL
    pub action: String,
    #[serde(serialize_with = "serialize_method")]
    pub method: HttpMethod,
    pub fields: Vec<FormField>,
    pub inner_html: String,
}

fn serialize_method<S: serde::Serializer>(method: &HttpMethod, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

impl Form {
    /// Named text-like fields, the ones worth injecting into
    pub fn injectable_fields(&self) -> Vec<&FormField> {
        self.fields
            .iter()
            .filter(|f| !f.name.is_empty() && f.kind.is_text_like())
            .collect()
    }

    /// Build a submission. Fields missing from `overrides` keep their current
    /// value or receive a type-appropriate placeholder. Overrides naming no
    /// field of the form are appended as extra parameters.
    pub fn fill(&self, overrides: &BTreeMap<String, String>) -> FormSubmission {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut used: HashSet<&str> = HashSet::new();
        let mut radio_groups_done: HashSet<&str> = HashSet::new();
        let mut submit_included = false;

        let checked_radios: HashMap<&str, &str> = self
            .fields
            .iter()
            .filter(|f| f.kind == FieldKind::Radio && f.checked)
            .map(|f| (f.name.as_str(), f.value.as_deref().unwrap_or("on")))
            .collect();

        for field in &self.fields {
            if field.name.is_empty() {
                continue;
            }
            let name = field.name.as_str();

            if let Some(value) = overrides.get(name) {
                if used.insert(name) {
                    fields.push((field.name.clone(), value.clone()));
                }
                continue;
            }

            match field.kind {
                FieldKind::File => {}
                FieldKind::Submit | FieldKind::Button => {
                    if field.kind == FieldKind::Submit && !submit_included {
                        submit_included = true;
                        fields.push((field.name.clone(), field.value.clone().unwrap_or_default()));
                    }
                }
                FieldKind::Radio => {
                    if radio_groups_done.insert(name) {
                        let value = checked_radios
                            .get(name)
                            .map(|v| v.to_string())
                            .or_else(|| field.value.clone())
                            .unwrap_or_else(|| "on".to_string());
                        fields.push((field.name.clone(), value));
                    }
                }
                FieldKind::Select => {
                    let value = field
                        .value
                        .clone()
                        .or_else(|| field.options.first().cloned())
                        .unwrap_or_default();
                    fields.push((field.name.clone(), value));
                }
                kind => {
                    let value = match &field.value {
                        Some(v) if !v.is_empty() => v.clone(),
                        _ => kind.placeholder().to_string(),
                    };
                    fields.push((field.name.clone(), value));
                }
            }
        }

        for (name, value) in overrides {
            if !used.contains(name.as_str()) && !self.fields.iter().any(|f| &f.name == name) {
                fields.push((name.clone(), value.clone()));
            }
        }

        FormSubmission {
            action: self.action.clone(),
            method: self.method,
            fields,
        }
    }

    /// One-line description for tool output
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| !f.name.is_empty())
            .map(|f| f.name.as_str())
            .collect();
        format!(
            "Form #{} ({} {}) fields: [{}]",
            self.number,
            self.method,
            self.action,
            names.join(", ")
        )
    }
}

fn selector(css: &str) -> Selector {
    // Only called with literal selectors
    Selector::parse(css).unwrap_or_else(|_| panic!("invalid selector: {}", css))
}

/// Resolve `href` against `base`, keeping only http(s) URLs without fragment
pub fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Absolute http(s) links on the page, deduplicated in document order
pub fn extract_links(base: &str, html: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let link_selector = selector("a[href], area[href]");
    let frame_selector = selector("iframe[src], frame[src]");

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let hrefs = document
        .select(&link_selector)
        .filter_map(|e| e.value().attr("href"))
        .chain(document.select(&frame_selector).filter_map(|e| e.value().attr("src")));

    for href in hrefs {
        if let Some(url) = resolve_url(&base, href) {
            let url = url.to_string();
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }
    }
    links
}

/// Every `<form>` on the page
pub fn extract_forms(base: &str, html: &str) -> Vec<Form> {
    let base_url = Url::parse(base).ok();
    let document = Html::parse_document(html);
    let form_selector = selector("form");
    let control_selector = selector("input, textarea, select, button");

    document
        .select(&form_selector)
        .enumerate()
        .map(|(i, form)| {
            let action_attr = form.value().attr("action").unwrap_or("").trim();
            let action = match &base_url {
                Some(base) if !action_attr.is_empty() => base
                    .join(action_attr)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| base.to_string()),
                Some(base) => base.to_string(),
                None => action_attr.to_string(),
            };

            let fields = form
                .select(&control_selector)
                .map(|control| parse_field(&control))
                .collect();

            Form {
                number: i + 1,
                action,
                method: form
                    .value()
                    .attr("method")
                    .and_then(|m| m.parse().ok())
                    .unwrap_or_default(),
                fields,
                inner_html: form.inner_html(),
            }
        })
        .collect()
}

fn parse_field(control: &ElementRef) -> FormField {
    let element = control.value();
    let name = element.attr("name").unwrap_or("").to_string();
    let required = element.attr("required").is_some();

    match element.name() {
        "textarea" => FormField {
            name,
            kind: FieldKind::Textarea,
            value: Some(control.text().collect::<String>()),
            required,
            checked: false,
            options: Vec::new(),
        },
        "select" => {
            let option_selector = selector("option");
            let mut options = Vec::new();
            let mut selected = None;
            for option in control.select(&option_selector) {
                let value = option
                    .value()
                    .attr("value")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| option.text().collect::<String>().trim().to_string());
                if option.value().attr("selected").is_some() && selected.is_none() {
                    selected = Some(value.clone());
                }
                options.push(value);
            }
            FormField {
                name,
                kind: FieldKind::Select,
                value: selected,
                required,
                checked: false,
                options,
            }
        }
        "button" => FormField {
            name,
            kind: FieldKind::from_input_type(element.attr("type").unwrap_or("submit")),
            value: element.attr("value").map(|v| v.to_string()),
            required,
            checked: false,
            options: Vec::new(),
        },
        _ => FormField {
            name,
            kind: FieldKind::from_input_type(element.attr("type").unwrap_or("text")),
            value: element.attr("value").map(|v| v.to_string()),
            required,
            checked: element.attr("checked").is_some(),
            options: Vec::new(),
        },
    }
}

/// Contents of `<title>`, trimmed
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = selector("title");
    document
        .select(&title_selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Human-visible text with whitespace collapsed, cut at `max_chars`
pub fn visible_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "head" | "template"))
                .unwrap_or(false)
        });
        if !hidden {
            text.push_str(chunk);
            text.push(' ');
        }
    }

    truncate_chars(&collapse_whitespace(&text), max_chars)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut a string at a character boundary, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}… [truncated]", cut)
}
