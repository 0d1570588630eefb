//! Client configuration.

use std::time::Duration;

/// Production endpoint used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.yachaq.io";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one [`YachaqClient`](crate::YachaqClient).
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `YACHAQ_BASE_URL` | `https://api.yachaq.io` | API base address |
/// | `YACHAQ_API_KEY` | (absent) | Key exchanged for a token by `authenticate` |
/// | `YACHAQ_ACCESS_TOKEN` | (absent) | Bearer token to start with |
/// | `YACHAQ_TIMEOUT_SECS` | `30` | Connect and request timeout |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Populate config from environment variables, applying defaults where
    /// absent or unparseable.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("YACHAQ_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout = std::env::var("YACHAQ_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Self {
            api_key: std::env::var("YACHAQ_API_KEY").ok(),
            access_token: std::env::var("YACHAQ_ACCESS_TOKEN").ok(),
            timeout,
            ..Self::new(&base_url)
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
