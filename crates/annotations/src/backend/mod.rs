//! Annotations API client
//!
//! The service only talks to the server through [`BackendClient`], so hosts
//! can plug in their own transport. [`HttpBackend`] is the reqwest one.

mod client;

pub use client::HttpBackend;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{AlertState, AnnotationEvent};
use crate::Result;

/// Parameters for `GET /api/annotations`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSearch {
    pub from: i64,
    pub to: i64,
    pub limit: Option<u32>,
    pub tags: Vec<String>,
    pub dashboard_id: Option<i64>,
    pub event_type: Option<String>,
}

impl AnnotationSearch {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("from", self.from.to_string()), ("to", self.to.to_string())];
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        for tag in &self.tags {
            pairs.push(("tags", tag.clone()));
        }
        if let Some(dashboard_id) = self.dashboard_id {
            pairs.push(("dashboardId", dashboard_id.to_string()));
        }
        if let Some(event_type) = &self.event_type {
            pairs.push(("type", event_type.clone()));
        }
        pairs
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// `GET /api/alerts/states-for-dashboard?dashboardId=<id>`
    async fn alert_states_for_dashboard(&self, dashboard_id: i64) -> Result<Vec<AlertState>>;

    /// `GET /api/annotations`
    async fn find_annotations(&self, search: &AnnotationSearch) -> Result<Vec<AnnotationEvent>>;

    /// `POST /api/annotations`
    async fn create_annotation(&self, event: &AnnotationEvent) -> Result<Value>;

    /// `PUT /api/annotations/{id}`
    async fn update_annotation(&self, id: i64, event: &AnnotationEvent) -> Result<Value>;

    /// `DELETE /api/annotations/{id}`
    async fn delete_annotation(&self, id: i64) -> Result<()>;

    /// `DELETE /api/annotations/region/{regionId}`
    async fn delete_region(&self, region_id: i64) -> Result<()>;
}
