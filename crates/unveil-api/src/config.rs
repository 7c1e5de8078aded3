//! API client configuration loaded from environment variables.
//!
//! All settings have defaults pointing at a local development backend, so
//! the client runs with zero configuration.

use std::time::Duration;

use unveil_shared::constants::{DEFAULT_API_URL, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_WS_URL};

/// Endpoints and timeouts for the backend.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the REST API, without a trailing slash.
    /// Env: `UNVEIL_API_URL`
    /// Default: `http://127.0.0.1:8080/api`
    pub base_url: String,

    /// WebSocket endpoint for the realtime channel.
    /// Env: `UNVEIL_WS_URL`
    /// Default: `ws://127.0.0.1:8080/ws`
    pub ws_url: String,

    /// Per-request timeout.
    /// Env: `UNVEIL_HTTP_TIMEOUT_SECS`
    /// Default: `15`
    pub http_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("UNVEIL_API_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(url) = std::env::var("UNVEIL_WS_URL") {
            config.ws_url = url;
        }

        if let Ok(val) = std::env::var("UNVEIL_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.http_timeout = Duration::from_secs(secs);
            } else {
                tracing::warn!(
                    value = %val,
                    "Invalid UNVEIL_HTTP_TIMEOUT_SECS, using default"
                );
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8080/api");
        assert_eq!(config.ws_url, "ws://127.0.0.1:8080/ws");
        assert_eq!(config.http_timeout, Duration::from_secs(15));
    }
}
