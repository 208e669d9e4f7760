use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_LLM_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "x-ai/grok-4-fast:free";

/// Which browser implementation the tools drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserBackend {
    Http,
    Chrome,
}

impl FromStr for BrowserBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" | "reqwest" => Ok(BrowserBackend::Http),
            "chrome" | "chromium" | "headless" => Ok(BrowserBackend::Chrome),
            _ => Err(format!("BROWSER_BACKEND must be 'http' or 'chrome', got '{}'", s)),
        }
    }
}

/// LLM connection settings shared by every agent in a crew
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub referer: String,
    pub app_title: String,
}

/// Limits applied by the crawl tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlLimits {
    pub max_pages: usize,
    pub max_depth: usize,
    pub max_per_pattern: usize,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_pages: 30,
            max_depth: 3,
            max_per_pattern: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub llm: LlmConfig,
    pub config_dir: PathBuf,
    pub static_dir: PathBuf,
    pub browser_backend: BrowserBackend,
    pub browser_timeout_secs: u64,
    pub crawl: CrawlLimits,
    pub max_tool_iterations: usize,
    pub max_concurrent_scans: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (env vars in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let browser_backend: BrowserBackend = get("BROWSER_BACKEND", "http").parse()?;

        Ok(Self {
            port: parse_number("PORT", &get("PORT", "5000"))?,
            llm: LlmConfig {
                api_key: get("OPENROUTER_API_KEY", ""),
                endpoint: get("LLM_ENDPOINT", DEFAULT_LLM_ENDPOINT),
                model: get("LLM_MODEL", DEFAULT_LLM_MODEL),
                max_tokens: parse_number("LLM_MAX_TOKENS", &get("LLM_MAX_TOKENS", "4096"))?,
                referer: get("LLM_REFERER", "http://localhost:5000"),
                app_title: get("LLM_APP_TITLE", "Autopatch"),
            },
            config_dir: PathBuf::from(get("CONFIG_DIR", "./config")),
            static_dir: PathBuf::from(get("STATIC_DIR", "./static")),
            browser_backend,
            browser_timeout_secs: parse_number("BROWSER_TIMEOUT_SECS", &get("BROWSER_TIMEOUT_SECS", "30"))?,
            crawl: CrawlLimits {
                max_pages: parse_positive("CRAWL_MAX_PAGES", &get("CRAWL_MAX_PAGES", "30"))?,
                max_depth: parse_number("CRAWL_MAX_DEPTH", &get("CRAWL_MAX_DEPTH", "3"))?,
                max_per_pattern: parse_positive("CRAWL_MAX_PER_PATTERN", &get("CRAWL_MAX_PER_PATTERN", "3"))?,
            },
            max_tool_iterations: parse_number("MAX_TOOL_ITERATIONS", &get("MAX_TOOL_ITERATIONS", "10"))?,
            max_concurrent_scans: parse_positive("MAX_CONCURRENT_SCANS", &get("MAX_CONCURRENT_SCANS", "2"))?,
        })
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{} must be a valid number, got '{}'", key, raw))
}

/// Limits where zero would make every scan a no-op
fn parse_positive(key: &str, raw: &str) -> Result<usize, String> {
    match parse_number(key, raw)? {
        0 => Err(format!("{} must be at least 1", key)),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.llm.endpoint, DEFAULT_LLM_ENDPOINT);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.app_title, "Autopatch");
        assert_eq!(config.browser_backend, BrowserBackend::Http);
        assert_eq!(config.crawl, CrawlLimits::default());
        assert_eq!(config.max_tool_iterations, 10);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8081"),
            ("OPENROUTER_API_KEY", "sk-test"),
            ("BROWSER_BACKEND", "Chrome"),
            ("CRAWL_MAX_PAGES", "5"),
            ("MAX_CONCURRENT_SCANS", "1"),
        ])
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.browser_backend, BrowserBackend::Chrome);
        assert_eq!(config.crawl.max_pages, 5);
        assert_eq!(config.max_concurrent_scans, 1);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = config_from(&[("PORT", "not-a-port")]).unwrap_err();
        assert!(err.contains("PORT"));

        let err = config_from(&[("BROWSER_BACKEND", "firefox")]).unwrap_err();
        assert!(err.contains("BROWSER_BACKEND"));
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        for key in ["CRAWL_MAX_PAGES", "CRAWL_MAX_PER_PATTERN", "MAX_CONCURRENT_SCANS"] {
            let err = config_from(&[(key, "0")]).unwrap_err();
            assert_eq!(err, format!("{} must be at least 1", key));
        }
        // Depth 0 means "start page only"
        assert_eq!(config_from(&[("CRAWL_MAX_DEPTH", "0")]).unwrap().crawl.max_depth, 0);
    }

    #[test]
    fn test_browser_backend_parses_aliases() {
        assert_eq!(" Chromium".parse::<BrowserBackend>(), Ok(BrowserBackend::Chrome));
        assert_eq!("reqwest".parse::<BrowserBackend>(), Ok(BrowserBackend::Http));
        assert!("firefox".parse::<BrowserBackend>().is_err());
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("LLM_MODEL", "  ")]).unwrap();
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
    }
}
