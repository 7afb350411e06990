use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn parsed_base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", self.base_url, e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default page size for the built-in annotation search.
    pub limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Config {
            api: ApiConfig {
                base_url: std::env::var("ANNOTATIONS_API_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                token: std::env::var("ANNOTATIONS_API_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty()),
                timeout_secs: std::env::var("ANNOTATIONS_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            query: QueryConfig {
                limit: std::env::var("ANNOTATIONS_QUERY_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
            },
        };

        if config.api.token.is_none() {
            tracing::warn!("ANNOTATIONS_API_TOKEN is not set. Requests will be sent unauthenticated.");
        }

        config.api.parsed_base_url()?;
        if config.api.timeout_secs == 0 {
            return Err(Error::Config(
                "ANNOTATIONS_HTTP_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:3000".to_string(),
                token: None,
                timeout_secs: 30,
            },
            query: QueryConfig::default(),
        }
    }
}
