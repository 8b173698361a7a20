use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::extract::SpanMode;
use crate::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL, DEMO_KEY};
use crate::resolver::DEFAULT_MAX_IMAGE_BYTES;

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub gemini_timeout: Duration,
    pub port: u16,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub max_image_bytes: usize,
    pub span_mode: SpanMode,
    /// Origin that upload URLs are minted under, without a trailing slash.
    pub public_base_url: String,
    pub allow_private_image_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: DEMO_KEY.to_string(),
            gemini_api_base: DEFAULT_API_BASE.to_string(),
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_timeout: Duration::from_secs(60),
            port: 8080,
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(60),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            span_mode: SpanMode::Greedy,
            public_base_url: "http://localhost:8080".to_string(),
            allow_private_image_hosts: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset and
    /// unparseable ones fall back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = parsed(&get, "PORT").unwrap_or(defaults.port);

        Self {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or(defaults.gemini_api_key),
            gemini_api_base: get("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_timeout: parsed(&get, "GEMINI_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.gemini_timeout),
            port,
            rate_limit_max: parsed(&get, "RATE_LIMIT_MAX").unwrap_or(defaults.rate_limit_max),
            rate_limit_window: parsed(&get, "RATE_LIMIT_WINDOW_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            max_image_bytes: parsed(&get, "MAX_IMAGE_BYTES").unwrap_or(defaults.max_image_bytes),
            span_mode: parsed(&get, "JSON_SPAN_MODE").unwrap_or(defaults.span_mode),
            public_base_url: get("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            allow_private_image_hosts: parsed(&get, "ALLOW_PRIVATE_IMAGE_HOSTS")
                .unwrap_or(defaults.allow_private_image_hosts),
        }
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = get(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}, using default", key, raw);
            None
        }
    }
}
