//! Datasource seam
//!
//! Annotation sources name a datasource; a [`DatasourceRegistry`] resolves
//! that name to something that can answer an annotation query.

mod builtin;

pub use builtin::{BuiltInDatasource, BUILT_IN_DATASOURCE};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{AnnotationEvent, AnnotationSource, Dashboard, TimeRange};
use crate::{Error, Result};

/// Everything a datasource gets to answer one annotation source.
#[derive(Debug, Clone)]
pub struct AnnotationQueryRequest {
    /// Requested range; `range.raw` carries the unresolved bounds.
    pub range: TimeRange,
    pub annotation: AnnotationSource,
    pub dashboard: Arc<Dashboard>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnnotationDatasource: Send + Sync {
    async fn annotation_query(&self, request: &AnnotationQueryRequest) -> Result<Vec<AnnotationEvent>>;
}

#[async_trait]
pub trait DatasourceRegistry: Send + Sync {
    /// Resolve a datasource by name; `None` asks for the default one.
    async fn get(&self, name: Option<&str>) -> Result<Arc<dyn AnnotationDatasource>>;
}

/// Registry over a fixed set of datasources.
#[derive(Default)]
pub struct StaticRegistry {
    datasources: HashMap<String, Arc<dyn AnnotationDatasource>>,
    default: Option<String>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datasource(mut self, name: impl Into<String>, datasource: Arc<dyn AnnotationDatasource>) -> Self {
        self.datasources.insert(name.into(), datasource);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }
}

#[async_trait]
impl DatasourceRegistry for StaticRegistry {
    async fn get(&self, name: Option<&str>) -> Result<Arc<dyn AnnotationDatasource>> {
        let name = name
            .or(self.default.as_deref())
            .ok_or_else(|| Error::DatasourceNotFound("no default datasource configured".to_string()))?;

        self.datasources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DatasourceNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_named_and_default() {
        let loki: Arc<dyn AnnotationDatasource> = Arc::new(MockAnnotationDatasource::new());
        let registry = StaticRegistry::new()
            .with_datasource("loki", loki.clone())
            .with_default("loki");

        let named = registry.get(Some("loki")).await.unwrap();
        assert!(Arc::ptr_eq(&named, &loki));
        let default = registry.get(None).await.unwrap();
        assert!(Arc::ptr_eq(&default, &loki));
    }

    #[tokio::test]
    async fn test_unknown_datasource() {
        let registry = StaticRegistry::new();
        let err = registry.get(Some("missing")).await.err().unwrap();
        assert!(matches!(err, Error::DatasourceNotFound(name) if name == "missing"));

        let err = registry.get(None).await.err().unwrap();
        assert!(matches!(err, Error::DatasourceNotFound(_)));
    }
}
