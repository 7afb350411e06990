use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{AnnotationDatasource, AnnotationQueryRequest};
use crate::backend::{AnnotationSearch, BackendClient};
use crate::models::AnnotationEvent;
use crate::Result;

/// Name dashboards use for annotations stored by the server itself.
pub const BUILT_IN_DATASOURCE: &str = "-- Grafana --";

/// Datasource backed by the server's own annotation store.
///
/// `dashboard` sources are scoped to the requesting dashboard; every other
/// source searches by its configured tags.
pub struct BuiltInDatasource {
    backend: Arc<dyn BackendClient>,
    default_limit: u32,
}

impl BuiltInDatasource {
    pub fn new(backend: Arc<dyn BackendClient>, default_limit: u32) -> Self {
        Self { backend, default_limit }
    }

    fn search_for(&self, request: &AnnotationQueryRequest) -> AnnotationSearch {
        let annotation = &request.annotation;
        let mut search = AnnotationSearch {
            from: request.range.from_millis(),
            to: request.range.to_millis(),
            limit: Some(annotation.limit.unwrap_or(self.default_limit)),
            ..Default::default()
        };

        if annotation.is_dashboard_scoped() {
            search.dashboard_id = request.dashboard.id;
        } else {
            search.tags = annotation.tags.clone().unwrap_or_default();
        }
        search
    }
}

#[async_trait]
impl AnnotationDatasource for BuiltInDatasource {
    async fn annotation_query(&self, request: &AnnotationQueryRequest) -> Result<Vec<AnnotationEvent>> {
        let search = self.search_for(request);
        if !request.annotation.is_dashboard_scoped() && search.tags.is_empty() {
            debug!("Source {} has no tags to search by", request.annotation.name);
            return Ok(Vec::new());
        }
        self.backend.find_annotations(&search).await
    }
}
