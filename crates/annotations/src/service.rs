use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    backend::BackendClient,
    cache::FetchCache,
    datasource::{AnnotationQueryRequest, DatasourceRegistry},
    events::{AppEvent, DashboardEvent, Notifier},
    metrics::ANNOTATION_QUERY_FAILURES_TOTAL,
    models::{AlertState, AnnotationEvent, AnnotationQuery, AnnotationSource, Dashboard, TimeRange},
    processing::{dedupe, filter_by_variables, filter_for_panel, pair_regions},
    Error, Result,
};

const QUERY_FAILED_TITLE: &str = "Annotation Query Failed";

/// What a panel gets back: its annotations and its alert's current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationsResult {
    pub annotations: Vec<AnnotationEvent>,
    pub alert_state: Option<AlertState>,
}

type SnapshotCapture = Arc<Mutex<HashMap<String, Vec<AnnotationEvent>>>>;

struct Session {
    key: String,
    cache: Arc<FetchCache>,
    captured: SnapshotCapture,
}

impl Session {
    fn new(key: String) -> Self {
        Self {
            key,
            cache: Arc::new(FetchCache::new()),
            captured: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Aggregates a dashboard's annotation sources and alert states for its
/// panels, caching fetches for the lifetime of one dashboard view.
pub struct AnnotationsService {
    backend: Arc<dyn BackendClient>,
    datasources: Arc<dyn DatasourceRegistry>,
    notifier: Notifier,
    session: Arc<Mutex<Session>>,
    refresh_listener: Mutex<Option<JoinHandle<()>>>,
}

impl AnnotationsService {
    pub fn new(backend: Arc<dyn BackendClient>, datasources: Arc<dyn DatasourceRegistry>) -> Self {
        Self {
            backend,
            datasources,
            notifier: Notifier::default(),
            session: Arc::new(Mutex::new(Session::new(String::new()))),
            refresh_listener: Mutex::new(None),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.notifier.subscribe()
    }

    /// Start a fresh session for `dashboard` and clear its caches on every
    /// refresh. The listener follows the current session, so it keeps working
    /// when the dashboard is saved and its key changes.
    pub async fn init(&self, dashboard: &Dashboard, mut refresh: broadcast::Receiver<DashboardEvent>) {
        {
            let mut session = self.session.lock().await;
            *session = Session::new(dashboard.session_key());
            info!("Annotation session started for dashboard {}", session.key);
        }

        let session = self.session.clone();
        let listener = tokio::spawn(async move {
            loop {
                match refresh.recv().await {
                    Ok(DashboardEvent::Refresh) => {
                        let (key, cache) = current_cache(&session).await;
                        debug!("Dashboard {} refreshed, clearing annotation caches", key);
                        cache.clear().await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        let (key, cache) = current_cache(&session).await;
                        warn!("Missed {} dashboard events for {}, clearing caches", missed, key);
                        cache.clear().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.refresh_listener.lock().await.replace(listener) {
            previous.abort();
        }
    }

    pub async fn clear_caches(&self) {
        self.session.lock().await.cache.clear().await;
    }

    /// Annotation data captured from live queries on a snapshot dashboard,
    /// keyed by annotation source name.
    pub async fn captured_snapshot_data(&self) -> HashMap<String, Vec<AnnotationEvent>> {
        let captured = self.session.lock().await.captured.clone();
        let data = captured.lock().await;
        data.clone()
    }

    /// Fetch, merge and filter everything `query.panel` should display.
    ///
    /// Never fails: on error the user is notified and the panel gets an
    /// empty result.
    pub async fn get_annotations(&self, query: &AnnotationQuery) -> AnnotationsResult {
        match self.try_get_annotations(query).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.user_message();
                error!("Annotation query failed for panel {}: {}", query.panel.id, e);
                ANNOTATION_QUERY_FAILURES_TOTAL.inc();
                self.notifier.publish(AppEvent::AlertError {
                    title: QUERY_FAILED_TITLE.to_string(),
                    message,
                });
                AnnotationsResult::default()
            }
        }
    }

    async fn try_get_annotations(&self, query: &AnnotationQuery) -> Result<AnnotationsResult> {
        let (cache, captured) = self.session_for(&query.dashboard).await;

        let (annotations, alert_states) = futures::join!(
            self.global_annotations(query, &cache, captured),
            self.alert_states(query, &cache),
        );
        let annotations = annotations?;
        let alert_states = alert_states?;

        let dashboard = &query.dashboard;
        let events = filter_for_panel(annotations.as_ref().clone(), &query.panel);
        let events = dedupe(events);
        let events = filter_by_variables(events, dashboard.variables(), &dashboard.filter_rules());
        let events = pair_regions(events, &query.range);

        let alert_state = alert_states
            .iter()
            .find(|state| state.panel_id == query.panel.id)
            .cloned();

        debug!(
            "Panel {} receives {} annotations (alert state: {})",
            query.panel.id,
            events.len(),
            alert_state.is_some()
        );

        Ok(AnnotationsResult {
            annotations: events,
            alert_state,
        })
    }

    async fn session_for(&self, dashboard: &Dashboard) -> (Arc<FetchCache>, SnapshotCapture) {
        let mut session = self.session.lock().await;
        let key = dashboard.session_key();
        if session.key != key {
            info!("Switching annotation session from '{}' to '{}'", session.key, key);
            *session = Session::new(key);
        }
        (session.cache.clone(), session.captured.clone())
    }

    async fn global_annotations(
        &self,
        query: &AnnotationQuery,
        cache: &FetchCache,
        captured: SnapshotCapture,
    ) -> Result<Arc<Vec<AnnotationEvent>>> {
        let registry = self.datasources.clone();
        let dashboard = query.dashboard.clone();
        let range = query.range.clone();

        cache
            .global_annotations
            .get_or_fetch(move || fetch_global_annotations(registry, dashboard, range, captured))
            .await
    }

    async fn alert_states(&self, query: &AnnotationQuery, cache: &FetchCache) -> Result<Arc<Vec<AlertState>>> {
        let Some(dashboard_id) = query.dashboard.id.filter(|id| *id != 0) else {
            return Ok(Arc::new(Vec::new()));
        };
        if !query.panel.has_alert() || !query.range.is_open_ended() {
            return Ok(Arc::new(Vec::new()));
        }

        let backend = self.backend.clone();
        cache
            .alert_states
            .get_or_fetch(move || async move { backend.alert_states_for_dashboard(dashboard_id).await })
            .await
    }

    /// `POST /api/annotations`
    pub async fn create(&self, event: &AnnotationEvent) -> Result<Value> {
        let result = self.backend.create_annotation(event).await;
        self.invalidate_global_annotations().await;
        result
    }

    /// `PUT /api/annotations/{id}`
    pub async fn update(&self, event: &AnnotationEvent) -> Result<Value> {
        let id = event
            .id
            .ok_or_else(|| Error::Validation("cannot update an annotation without an id".to_string()))?;
        let result = self.backend.update_annotation(id, event).await;
        self.invalidate_global_annotations().await;
        result
    }

    /// Delete a single annotation, or the whole region it belongs to.
    pub async fn delete(&self, event: &AnnotationEvent) -> Result<()> {
        let result = if event.is_region {
            let region_id = event
                .region()
                .ok_or_else(|| Error::Validation("cannot delete a region without a region id".to_string()))?;
            self.backend.delete_region(region_id).await
        } else {
            let id = event
                .id
                .ok_or_else(|| Error::Validation("cannot delete an annotation without an id".to_string()))?;
            self.backend.delete_annotation(id).await
        };
        self.invalidate_global_annotations().await;
        result
    }

    async fn invalidate_global_annotations(&self) {
        let cache = self.session.lock().await.cache.clone();
        cache.global_annotations.invalidate().await;
    }
}

impl Drop for AnnotationsService {
    fn drop(&mut self) {
        if let Some(listener) = self.refresh_listener.get_mut().take() {
            listener.abort();
        }
    }
}

async fn current_cache(session: &Mutex<Session>) -> (String, Arc<FetchCache>) {
    let session = session.lock().await;
    (session.key.clone(), session.cache.clone())
}

async fn fetch_global_annotations(
    registry: Arc<dyn DatasourceRegistry>,
    dashboard: Arc<Dashboard>,
    range: TimeRange,
    captured: SnapshotCapture,
) -> Result<Vec<AnnotationEvent>> {
    let fetches = dashboard
        .annotations
        .list
        .iter()
        .filter(|source| source.enable)
        .map(|source| {
            fetch_source(
                registry.clone(),
                dashboard.clone(),
                range.clone(),
                source.clone(),
                captured.clone(),
            )
        })
        .collect::<Vec<_>>();

    let per_source = join_all(fetches)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
    Ok(per_source.into_iter().flatten().collect())
}

async fn fetch_source(
    registry: Arc<dyn DatasourceRegistry>,
    dashboard: Arc<Dashboard>,
    range: TimeRange,
    source: AnnotationSource,
    captured: SnapshotCapture,
) -> Result<Vec<AnnotationEvent>> {
    if let Some(snapshot) = &source.snapshot_data {
        debug!("Serving annotation source {} from snapshot data", source.name);
        return Ok(attach_source(snapshot.clone(), &source));
    }

    let datasource = registry.get(source.datasource.as_deref()).await?;
    let request = AnnotationQueryRequest {
        range,
        annotation: source.clone(),
        dashboard: dashboard.clone(),
    };
    let results = datasource.annotation_query(&request).await?;

    if dashboard.snapshot {
        captured
            .lock()
            .await
            .entry(source.name.clone())
            .or_insert_with(|| results.clone());
    }

    Ok(attach_source(results, &source))
}

fn attach_source(events: Vec<AnnotationEvent>, source: &AnnotationSource) -> Vec<AnnotationEvent> {
    let source = Arc::new(source.without_snapshot());
    events
        .into_iter()
        .map(|mut event| {
            event.source = Some(source.clone());
            event
        })
        .collect()
}
