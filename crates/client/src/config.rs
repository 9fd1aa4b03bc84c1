//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CACHE_PROBE_ENDPOINT` - GraphQL endpoint (default: `http://localhost:8081/graphql`)

use thiserror::Error;
use url::Url;

/// Endpoint used when nothing is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8081/graphql";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),

    #[error("Invalid endpoint {0}: {1}")]
    InvalidEndpoint(String, String),
}

/// Where the client sends its operations.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // The constant is a valid absolute URL.
            endpoint: Url::parse(DEFAULT_ENDPOINT).unwrap_or_else(|_| unreachable!()),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `CACHE_PROBE_ENDPOINT` is not an http(s) URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        match std::env::var("CACHE_PROBE_ENDPOINT")
            .ok()
            .filter(|v| !v.is_empty())
        {
            Some(raw) => Self::with_endpoint(&raw).map_err(|e| match e {
                ConfigError::InvalidEndpoint(value, reason) => ConfigError::InvalidEnvVar(
                    "CACHE_PROBE_ENDPOINT".to_string(),
                    format!("{value}: {reason}"),
                ),
                other => other,
            }),
            None => Ok(Self::default()),
        }
    }

    /// Configuration pointing at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEndpoint` unless `endpoint` is an
    /// absolute http or https URL.
    pub fn with_endpoint(endpoint: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(endpoint.to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(
                endpoint.to_string(),
                format!("unsupported scheme {}", url.scheme()),
            ));
        }
        Ok(Self { endpoint: url })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            ClientConfig::default().endpoint.as_str(),
            "http://localhost:8081/graphql"
        );
    }

    #[test]
    fn test_with_endpoint() {
        let config = ClientConfig::with_endpoint("http://127.0.0.1:9000/graphql").unwrap();
        assert_eq!(config.endpoint.port(), Some(9000));
    }

    #[test]
    fn test_rejects_non_http_endpoints() {
        assert!(matches!(
            ClientConfig::with_endpoint("ftp://example.com/graphql"),
            Err(ConfigError::InvalidEndpoint(..))
        ));
        assert!(matches!(
            ClientConfig::with_endpoint("not a url"),
            Err(ConfigError::InvalidEndpoint(..))
        ));
    }
}
