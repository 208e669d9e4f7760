//! Passive security header audit of a single response

use super::open_page;
use crate::browser::Page;
use crate::tools::registry::Tool;
use crate::tools::types::{
    parse_params, parse_target_url, url_property, ToolContext, ToolDefinition, ToolGroup,
    ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

static VERSIONED_SERVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)+").unwrap());
static HSTS_MAX_AGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)max-age\s*=\s*(\d+)").unwrap());

/// Six months, the shortest max-age considered adequate
const MIN_HSTS_MAX_AGE: u64 = 15_552_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub detail: String,
}

fn finding(severity: Severity, title: &str, detail: impl Into<String>) -> Finding {
    Finding {
        severity,
        title: title.to_string(),
        detail: detail.into(),
    }
}

fn check_csp(page: &Page, findings: &mut Vec<Finding>) -> Option<String> {
    let Some(csp) = page.header("content-security-policy") else {
        findings.push(finding(
            Severity::Medium,
            "Missing Content-Security-Policy",
            "No CSP protection against XSS and data injection",
        ));
        return None;
    };
    let lower = csp.to_lowercase();
    for keyword in ["unsafe-inline", "unsafe-eval"] {
        if lower.contains(keyword) {
            findings.push(finding(
                Severity::Medium,
                "Weak Content-Security-Policy",
                format!("CSP allows '{}': {}", keyword, csp),
            ));
        }
    }
    if lower.split(|c: char| c.is_whitespace() || c == ';').any(|t| t == "*") {
        findings.push(finding(
            Severity::Low,
            "Permissive Content-Security-Policy",
            format!("CSP uses a wildcard source: {}", csp),
        ));
    }
    Some(lower)
}

fn check_framing(page: &Page, csp: Option<&str>, findings: &mut Vec<Finding>) {
    let has_frame_ancestors = csp.is_some_and(|c| c.contains("frame-ancestors"));
    match page.header("x-frame-options") {
        Some(xfo) => {
            let v = xfo.trim().to_lowercase();
            if v != "deny" && v != "sameorigin" && !has_frame_ancestors {
                findings.push(finding(
                    Severity::Medium,
                    "Invalid X-Frame-Options",
                    format!("Unrecognised value '{}'; page may be framed (clickjacking)", xfo),
                ));
            }
        }
        None if !has_frame_ancestors => findings.push(finding(
            Severity::Medium,
            "Missing clickjacking protection",
            "Neither X-Frame-Options nor CSP frame-ancestors is set",
        )),
        None => {}
    }
}

fn check_simple_headers(page: &Page, findings: &mut Vec<Finding>) {
    match page.header("x-content-type-options") {
        Some(v) if v.trim().eq_ignore_ascii_case("nosniff") => {}
        Some(v) => findings.push(finding(
            Severity::Low,
            "Invalid X-Content-Type-Options",
            format!("Expected 'nosniff', got '{}'", v),
        )),
        None => findings.push(finding(
            Severity::Low,
            "Missing X-Content-Type-Options",
            "Browsers may MIME-sniff responses",
        )),
    }

    match page.header("referrer-policy") {
        Some(v) if v.to_lowercase().contains("unsafe-url") => findings.push(finding(
            Severity::Low,
            "Weak Referrer-Policy",
            format!("'unsafe-url' leaks full URLs to third parties: {}", v),
        )),
        Some(_) => {}
        None => findings.push(finding(
            Severity::Info,
            "Missing Referrer-Policy",
            "Browser default policy applies",
        )),
    }

    if page.header("permissions-policy").is_none() && page.header("feature-policy").is_none() {
        findings.push(finding(
            Severity::Info,
            "Missing Permissions-Policy",
            "Powerful browser features are not restricted",
        ));
    }
}

fn check_hsts(page: &Page, https: bool, findings: &mut Vec<Finding>) {
    if !https {
        return;
    }
    match page.header("strict-transport-security") {
        None => findings.push(finding(
            Severity::Medium,
            "Missing Strict-Transport-Security",
            "HTTPS site without HSTS is open to SSL stripping",
        )),
        Some(hsts) => {
            let max_age = HSTS_MAX_AGE
                .captures(hsts)
                .and_then(|c| c[1].parse::<u64>().ok())
                .unwrap_or(0);
            if max_age < MIN_HSTS_MAX_AGE {
                findings.push(finding(
                    Severity::Low,
                    "Weak Strict-Transport-Security",
                    format!("max-age {} is shorter than six months: {}", max_age, hsts),
                ));
            }
        }
    }
}

fn check_cookies(page: &Page, https: bool, findings: &mut Vec<Finding>) {
    for cookie in page.header_values("set-cookie") {
        let mut parts = cookie.split(';').map(|p| p.trim());
        let name = parts
            .next()
            .and_then(|nv| nv.split('=').next())
            .unwrap_or("")
            .to_string();
        let attributes: Vec<String> = parts.map(|p| p.to_lowercase()).collect();
        let has = |attr: &str| attributes.iter().any(|a| a == attr || a.starts_with(&format!("{}=", attr)));

        let mut missing = Vec::new();
        if https && !has("secure") {
            missing.push("Secure");
        }
        if !has("httponly") {
            missing.push("HttpOnly");
        }
        if !has("samesite") {
            missing.push("SameSite");
        }
        if attributes.iter().any(|a| a == "samesite=none") && !has("secure") {
            missing.push("Secure (required with SameSite=None)");
        }
        if !missing.is_empty() {
            findings.push(finding(
                Severity::Medium,
                "Insecure cookie flags",
                format!("Cookie '{}' lacks {}", name, missing.join(", ")),
            ));
        }
    }
}

fn check_information_leaks(page: &Page, findings: &mut Vec<Finding>) {
    if let Some(server) = page.header("server") {
        if VERSIONED_SERVER.is_match(server) {
            findings.push(finding(
                Severity::Low,
                "Server version disclosed",
                format!("Server: {}", server),
            ));
        }
    }
    if let Some(powered_by) = page.header("x-powered-by") {
        findings.push(finding(
            Severity::Low,
            "Technology disclosed",
            format!("X-Powered-By: {}", powered_by),
        ));
    }
    if let Some(aspnet) = page.header("x-aspnet-version") {
        findings.push(finding(
            Severity::Low,
            "Technology disclosed",
            format!("X-AspNet-Version: {}", aspnet),
        ));
    }
}

/// Audit the headers of one response
pub fn audit(page: &Page, https: bool) -> Vec<Finding> {
    let mut findings = Vec::new();
    let csp = check_csp(page, &mut findings);
    check_framing(page, csp.as_deref(), &mut findings);
    check_simple_headers(page, &mut findings);
    check_hsts(page, https, &mut findings);
    check_cookies(page, https, &mut findings);
    check_information_leaks(page, &mut findings);
    findings.sort_by_key(|f| f.severity);
    findings
}

pub struct HeaderCheckTool {
    definition: ToolDefinition,
}

impl HeaderCheckTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("url".to_string(), url_property());

        HeaderCheckTool {
            definition: ToolDefinition {
                name: "header_check".to_string(),
                description: "Check a page's HTTP response for missing or weak security headers (CSP, clickjacking protection, X-Content-Type-Options, Referrer-Policy, Permissions-Policy, HSTS), insecure cookie flags and version disclosure.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["url".to_string()],
                },
                group: ToolGroup::Audit,
            },
        }
    }
}

impl Default for HeaderCheckTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct HeaderCheckParams {
    url: String,
}

#[async_trait]
impl Tool for HeaderCheckTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: HeaderCheckParams = match parse_params(params) {
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

        if page.headers.is_empty() {
            return ToolResult::success(format!(
                "No response headers are observable for {} with the '{}' browser backend; header checks were skipped.",
                url,
                context.launcher.name()
            ));
        }

        let https = page.url.starts_with("https://");
        let findings = audit(&page, https);

        let mut out = format!(
            "Security header check of {} (status {}): {} finding{}.\n",
            page.url,
            page.status,
            findings.len(),
            if findings.len() == 1 { "" } else { "s" }
        );
        for f in &findings {
            out.push_str(&format!("- [{}] {}: {}\n", f.severity.as_str(), f.title, f.detail));
        }
        if findings.is_empty() {
            out.push_str("All checked headers are present and well configured.\n");
        }

        ToolResult::success(out).with_metadata(json!({
            "url": url.as_str(),
            "final_url": page.url,
            "findings": findings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakeSite;
    use crate::tools::builtin::test_support::context_for;

    fn page(headers: &[(&str, &str)]) -> Page {
        Page {
            url: "https://shop.test/".to_string(),
            status: 200,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            html: String::new(),
        }
    }

    fn titles(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.title.as_str()).collect()
    }

    #[test]
    fn test_hardened_response_has_no_findings() {
        let findings = audit(
            &page(&[
                ("Content-Security-Policy", "default-src 'self'; frame-ancestors 'none'"),
                ("X-Content-Type-Options", "nosniff"),
                ("Referrer-Policy", "strict-origin-when-cross-origin"),
                ("Permissions-Policy", "camera=()"),
                ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
                ("Set-Cookie", "sid=abc; Path=/; Secure; HttpOnly; SameSite=Lax"),
                ("Server", "nginx"),
            ]),
            true,
        );
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_bare_response_reports_everything() {
        let findings = audit(&page(&[("Set-Cookie", "sid=abc; Path=/")]), true);
        let t = titles(&findings);
        assert!(t.contains(&"Missing Content-Security-Policy"));
        assert!(t.contains(&"Missing clickjacking protection"));
        assert!(t.contains(&"Missing X-Content-Type-Options"));
        assert!(t.contains(&"Missing Referrer-Policy"));
        assert!(t.contains(&"Missing Permissions-Policy"));
        assert!(t.contains(&"Missing Strict-Transport-Security"));
        let cookie = findings.iter().find(|f| f.title == "Insecure cookie flags").unwrap();
        assert_eq!(cookie.detail, "Cookie 'sid' lacks Secure, HttpOnly, SameSite");
        // most severe first
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings.last().unwrap().severity, Severity::Info);
    }

    #[test]
    fn test_weak_values() {
        let findings = audit(
            &page(&[
                ("Content-Security-Policy", "script-src 'self' 'unsafe-inline' 'unsafe-eval' *"),
                ("X-Frame-Options", "ALLOW-FROM https://x.test"),
                ("Strict-Transport-Security", "max-age=60"),
                ("Server", "Apache/2.4.41 (Ubuntu)"),
                ("X-Powered-By", "PHP/7.4.3"),
            ]),
            true,
        );
        let details: Vec<&str> = findings.iter().map(|f| f.detail.as_str()).collect();
        assert!(details.iter().any(|d| d.contains("'unsafe-inline'")));
        assert!(details.iter().any(|d| d.contains("'unsafe-eval'")));
        let t = titles(&findings);
        assert!(t.contains(&"Permissive Content-Security-Policy"));
        assert!(t.contains(&"Invalid X-Frame-Options"));
        assert!(t.contains(&"Weak Strict-Transport-Security"));
        assert!(t.contains(&"Server version disclosed"));
        assert!(t.contains(&"Technology disclosed"));
    }

    #[test]
    fn test_hsts_and_secure_flag_only_matter_on_https() {
        let findings = audit(&page(&[("Set-Cookie", "sid=1; HttpOnly; SameSite=Strict")]), false);
        let t = titles(&findings);
        assert!(!t.contains(&"Missing Strict-Transport-Security"));
        assert!(!t.contains(&"Insecure cookie flags"));
    }

    #[tokio::test]
    async fn test_tool_output() {
        let site = FakeSite::new();
        site.page_with(
            "http://shop.test/",
            200,
            vec![
                ("X-Powered-By".to_string(), "Express".to_string()),
                ("Content-Type".to_string(), "text/html".to_string()),
            ],
            "<p>hi</p>",
        );
        let result = HeaderCheckTool::new()
            .execute(json!({"url": "http://shop.test/"}), &context_for(&site))
            .await;
        assert!(result.success);
        assert!(result.content.starts_with("Security header check of http://shop.test/ (status 200):"));
        assert!(result.content.contains("- [LOW] Technology disclosed: X-Powered-By: Express"));
        assert!(!result.content.contains("Strict-Transport-Security"));
    }

    #[tokio::test]
    async fn test_headerless_backend_is_reported() {
        let site = FakeSite::new();
        site.page_with("http://shop.test/", 200, vec![], "<p>hi</p>");
        let result = HeaderCheckTool::new()
            .execute(json!({"url": "http://shop.test/"}), &context_for(&site))
            .await;
        assert!(result.success);
        assert!(result.content.contains("No response headers are observable"));
    }
}
