use std::collections::HashMap;

use anyhow::{bail, Result};

pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_OPENROUTER_MODEL: &str = "deepseek/deepseek-r1-0528-qwen3-8b:free";
pub const DEFAULT_LOG_FILTER: &str =
    "lexrisk_server=info,lexrisk_core=info,lexrisk_agent=info,tower_http=debug";

/// Full application configuration, read from the environment and `.env`.
/// Process environment wins over `.env`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_name: String,
    /// Route prefix for the HTTP API, e.g. "/api/v1".
    pub api_prefix: String,
    /// When true, 500 responses carry the full error chain.
    pub debug: bool,

    // Analyzer backend
    /// "openrouter" (default) or "keyword".
    pub backend: String,
    pub openrouter_api_key: String,
    pub openrouter_url: String,
    pub openrouter_model: String,
    pub openrouter_temperature: f32,
    pub analyzer_timeout_s: u64,
    /// Outbound connection pool size; also bounds the per-document clause fan-out.
    pub analyzer_max_concurrency: usize,
    /// "strict", "moderate" or "lenient" (keyword backend only).
    pub keyword_tolerance: String,

    // Web
    pub web_bind: String,
    pub web_port: u16,
    pub max_upload_mb: usize,

    // Logging
    pub log_level: String,
    /// "text" (default) or "json".
    pub log_format: String,
}

fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

fn read_dotenv() -> HashMap<String, String> {
    std::fs::read_to_string(".env")
        .map(|c| parse_dotenv(&c))
        .unwrap_or_default()
}

/// Key lookup over the process environment with a `.env` map behind it.
struct Source<'a> {
    env: &'a dyn Fn(&str) -> Option<String>,
    dotenv: &'a HashMap<String, String>,
}

impl Source<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.env)(key).or_else(|| self.dotenv.get(key).cloned())
    }

    fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).as_deref() {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => default,
        }
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dotenv = read_dotenv();
        let env = |k: &str| std::env::var(k).ok();
        Self::from_source(&Source {
            env: &env,
            dotenv: &dotenv,
        })
    }

    /// Builds a config from an explicit key/value map, ignoring the process environment.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let none = |_: &str| -> Option<String> { None };
        Self::from_source(&Source {
            env: &none,
            dotenv: map,
        })
    }

    fn from_source(src: &Source<'_>) -> Result<Self> {
        let config = Config {
            project_name: src.get_str("PROJECT_NAME", "Legal Document Analyzer"),
            api_prefix: src.get_str("API_V1_STR", "/api/v1"),
            debug: src.get_bool("DEBUG", false),
            backend: src.get_str("BACKEND", "openrouter").to_lowercase(),
            openrouter_api_key: src.get_str("OPENROUTER_API_KEY", ""),
            openrouter_url: src.get_str("OPENROUTER_URL", DEFAULT_OPENROUTER_URL),
            openrouter_model: src.get_str("OPENROUTER_MODEL", DEFAULT_OPENROUTER_MODEL),
            openrouter_temperature: src.get_parsed("OPENROUTER_TEMPERATURE", 0.3),
            analyzer_timeout_s: src.get_parsed("ANALYZER_TIMEOUT_S", 60),
            analyzer_max_concurrency: src.get_parsed("ANALYZER_MAX_CONCURRENCY", 4usize).max(1),
            keyword_tolerance: src.get_str("KEYWORD_TOLERANCE", "moderate").to_lowercase(),
            web_bind: src.get_str("WEB_BIND", "0.0.0.0"),
            web_port: src.get_parsed("WEB_PORT", 8001),
            max_upload_mb: src.get_parsed("MAX_UPLOAD_MB", 20),
            log_level: src.get_str("LOG_LEVEL", DEFAULT_LOG_FILTER),
            log_format: src.get_str("LOG_FORMAT", "text").to_lowercase(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.backend.as_str() {
            "openrouter" if self.openrouter_api_key.trim().is_empty() => {
                bail!("OpenRouter API key is not configured (set OPENROUTER_API_KEY)")
            }
            "openrouter" | "keyword" => {}
            other => bail!("unknown BACKEND {other:?}; expected \"openrouter\" or \"keyword\""),
        }
        if !self.api_prefix.starts_with('/') {
            bail!("API_V1_STR must start with '/', got {:?}", self.api_prefix);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.web_bind, self.web_port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
