pub mod backend;
pub mod cache;
pub mod config;
pub mod datasource;
pub mod events;
pub mod metrics;
pub mod models;
pub mod processing;
pub mod service;

pub use service::{AnnotationsResult, AnnotationsService};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(ApiError),
    #[error("Datasource error: {0}")]
    Datasource(String),
    #[error("Datasource not found: {0}")]
    DatasourceNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{0}")]
    Shared(Arc<Error>),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Message suitable for showing to a dashboard user.
    ///
    /// Prefers the message the API put at the top level of its error body,
    /// then the nested `data.message`, then the error's own display.
    pub fn user_message(&self) -> String {
        match self {
            Error::Api(api) => api
                .message
                .clone()
                .or_else(|| api.data.as_ref().and_then(|d| d.message.clone()))
                .unwrap_or_else(|| self.to_string()),
            Error::Shared(inner) => inner.user_message(),
            _ => self.to_string(),
        }
    }
}

/// Error body returned by the annotations API on a non-success status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ApiErrorData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} (status {})", message, self.status),
            None => write!(f, "request failed with status {}", self.status),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
