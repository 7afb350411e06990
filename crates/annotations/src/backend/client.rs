use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{AnnotationSearch, BackendClient};
use crate::config::ApiConfig;
use crate::models::{AlertState, AnnotationEvent};
use crate::{ApiError, Error, Result};

/// [`BackendClient`] over HTTP with optional bearer auth.
pub struct HttpBackend {
    base_url: Url,
    client: Client,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.parsed_base_url()?,
            client: Client::new(),
            auth_token: config.token.clone(),
            timeout: config.timeout(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| Error::Config(format!("Invalid endpoint '{}': {}", joined, e)))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let mut request = request.timeout(self.timeout);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut api_error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| ApiError {
                message: (!body.trim().is_empty()).then(|| body.trim().to_string()),
                ..Default::default()
            });
            api_error.status = status.as_u16();
            return Err(Error::Api(api_error));
        }

        Ok(response)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.execute(request).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn alert_states_for_dashboard(&self, dashboard_id: i64) -> Result<Vec<AlertState>> {
        let url = self.endpoint("/api/alerts/states-for-dashboard")?;
        debug!("Fetching alert states for dashboard {}", dashboard_id);
        self.send(self.client.get(url).query(&[("dashboardId", dashboard_id)]))
            .await
    }

    async fn find_annotations(&self, search: &AnnotationSearch) -> Result<Vec<AnnotationEvent>> {
        let url = self.endpoint("/api/annotations")?;
        debug!("Searching annotations from {} to {}", search.from, search.to);
        self.send(self.client.get(url).query(&search.query_pairs())).await
    }

    async fn create_annotation(&self, event: &AnnotationEvent) -> Result<Value> {
        let url = self.endpoint("/api/annotations")?;
        self.send(self.client.post(url).json(event)).await
    }

    async fn update_annotation(&self, id: i64, event: &AnnotationEvent) -> Result<Value> {
        let url = self.endpoint(&format!("/api/annotations/{}", id))?;
        self.send(self.client.put(url).json(event)).await
    }

    async fn delete_annotation(&self, id: i64) -> Result<()> {
        let url = self.endpoint(&format!("/api/annotations/{}", id))?;
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    async fn delete_region(&self, region_id: i64) -> Result<()> {
        let url = self.endpoint(&format!("/api/annotations/region/{}", region_id))?;
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }
}
