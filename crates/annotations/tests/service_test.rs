use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use panel_annotations::{
    backend::{AnnotationSearch, BackendClient},
    datasource::{
        AnnotationDatasource, AnnotationQueryRequest, BuiltInDatasource, StaticRegistry, BUILT_IN_DATASOURCE,
    },
    events::{AppEvent, DashboardEvent},
    models::{
        AlertState, AnnotationEvent, AnnotationList, AnnotationQuery, AnnotationSource, Dashboard, PanelRef,
        Templating, TemplateVariable, TimeRange, VariableCurrent, VariableOption, VariableValue,
    },
    AnnotationsService, Error, Result,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

#[derive(Default)]
struct FakeBackend {
    alert_state_calls: AtomicUsize,
    searches: Mutex<Vec<AnnotationSearch>>,
    stored: Vec<AnnotationEvent>,
    writes: Mutex<Vec<String>>,
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn alert_states_for_dashboard(&self, dashboard_id: i64) -> Result<Vec<AlertState>> {
        self.alert_state_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![serde_json::from_value(json!({
            "id": 1,
            "dashboardId": dashboard_id,
            "panelId": 2,
            "state": "pending",
            "evalData": { "noData": true }
        }))?])
    }

    async fn find_annotations(&self, search: &AnnotationSearch) -> Result<Vec<AnnotationEvent>> {
        self.searches.lock().unwrap().push(search.clone());
        Ok(self.stored.clone())
    }

    async fn create_annotation(&self, _event: &AnnotationEvent) -> Result<Value> {
        self.writes.lock().unwrap().push("create".into());
        Ok(json!({ "id": 100 }))
    }

    async fn update_annotation(&self, id: i64, _event: &AnnotationEvent) -> Result<Value> {
        self.writes.lock().unwrap().push(format!("update {}", id));
        Ok(json!({}))
    }

    async fn delete_annotation(&self, id: i64) -> Result<()> {
        self.writes.lock().unwrap().push(format!("delete {}", id));
        Ok(())
    }

    async fn delete_region(&self, region_id: i64) -> Result<()> {
        self.writes.lock().unwrap().push(format!("delete region {}", region_id));
        Ok(())
    }
}

/// Datasource that waits for `gate` before answering and counts queries.
struct GatedDatasource {
    queries: AtomicUsize,
    gate: Arc<Notify>,
    events: Vec<AnnotationEvent>,
}

#[async_trait]
impl AnnotationDatasource for GatedDatasource {
    async fn annotation_query(&self, _request: &AnnotationQueryRequest) -> Result<Vec<AnnotationEvent>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(self.events.clone())
    }
}

struct StaticDatasource(Result<Vec<AnnotationEvent>>);

#[async_trait]
impl AnnotationDatasource for StaticDatasource {
    async fn annotation_query(&self, _request: &AnnotationQueryRequest) -> Result<Vec<AnnotationEvent>> {
        match &self.0 {
            Ok(events) => Ok(events.clone()),
            Err(e) => Err(Error::Datasource(e.to_string())),
        }
    }
}

fn tagged(id: Option<i64>, time: i64, tags: &[&str]) -> AnnotationEvent {
    AnnotationEvent {
        id,
        time: Some(time),
        tags: Some(tags.iter().map(|t| t.to_string()).collect()),
        ..Default::default()
    }
}

fn source(name: &str, datasource: &str) -> AnnotationSource {
    AnnotationSource {
        name: name.into(),
        enable: true,
        datasource: Some(datasource.into()),
        ..Default::default()
    }
}

fn live_query(dashboard: Dashboard, panel: PanelRef) -> AnnotationQuery {
    AnnotationQuery {
        panel,
        dashboard: Arc::new(dashboard),
        range: TimeRange::last(Duration::hours(1)),
    }
}

#[tokio::test]
async fn test_concurrent_panels_share_one_fetch() {
    let gate = Arc::new(Notify::new());
    let datasource = Arc::new(GatedDatasource {
        queries: AtomicUsize::new(0),
        gate: gate.clone(),
        events: vec![tagged(None, 10, &["a"])],
    });
    let registry = StaticRegistry::new().with_datasource("loki", datasource.clone());
    let service = AnnotationsService::new(Arc::new(FakeBackend::default()), Arc::new(registry));

    let dashboard = Dashboard {
        id: Some(1),
        uid: Some("ops".into()),
        annotations: AnnotationList {
            list: vec![source("Logs", "loki")],
        },
        ..Default::default()
    };
    let first = live_query(dashboard.clone(), PanelRef::new(1));
    let second = live_query(dashboard, PanelRef::new(2));

    let release = async {
        while datasource.queries.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        gate.notify_one();
    };
    let (a, b, _) = tokio::join!(service.get_annotations(&first), service.get_annotations(&second), release);

    assert_eq!(datasource.queries.load(Ordering::SeqCst), 1);
    assert_eq!(a.annotations, b.annotations);
    assert_eq!(a.annotations.len(), 1);
}

#[tokio::test]
async fn test_full_pipeline() {
    let metrics = vec![
        // Region start/end pair, tagged for prod.
        AnnotationEvent {
            id: Some(20),
            region_id: Some(20),
            ..tagged(Some(20), 2_000, &["prod"])
        },
        AnnotationEvent {
            id: Some(21),
            region_id: Some(20),
            ..tagged(Some(21), 4_000, &["prod"])
        },
        // Staging deploy, filtered out by the env variable.
        tagged(Some(22), 3_000, &["staging"]),
        // Untagged marker, always dropped.
        AnnotationEvent {
            id: Some(23),
            time: Some(3_500),
            ..Default::default()
        },
    ];
    let logs = vec![tagged(None, 1_500, &["prod", "logs"]), tagged(None, 1_500, &["logs", "prod"])];

    let registry = StaticRegistry::new()
        .with_datasource("prometheus", Arc::new(StaticDatasource(Ok(metrics))))
        .with_datasource("loki", Arc::new(StaticDatasource(Ok(logs))));
    let backend = Arc::new(FakeBackend::default());
    let service = AnnotationsService::new(backend.clone(), Arc::new(registry));

    let mut env = source("env", "prometheus");
    env.filter_by_variable = true;
    let dashboard = Dashboard {
        id: Some(1),
        uid: Some("ops".into()),
        annotations: AnnotationList {
            list: vec![env, source("Logs", "loki")],
        },
        templating: Templating {
            list: vec![TemplateVariable {
                name: "env".into(),
                current: VariableCurrent {
                    value: VariableValue::Multi(vec!["$__all".into()]),
                },
                options: vec![
                    VariableOption { value: "$__all".into() },
                    VariableOption { value: "prod".into() },
                ],
            }],
        },
        ..Default::default()
    };

    let query = AnnotationQuery {
        panel: PanelRef {
            id: 2,
            alert: Some(json!({ "name": "Errors" })),
            transform: None,
        },
        dashboard: Arc::new(dashboard),
        range: TimeRange {
            from: Utc.timestamp_millis_opt(1_000).unwrap(),
            to: Utc.timestamp_millis_opt(9_000).unwrap(),
            raw: panel_annotations::models::RawTimeRange {
                from: "now-1h".into(),
                to: "now".into(),
            },
        },
    };

    let result = service.get_annotations(&query).await;

    let summary: Vec<(Option<i64>, Option<i64>, Option<i64>, bool)> = result
        .annotations
        .iter()
        .map(|e| (e.id, e.time, e.time_end, e.is_region))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Some(20), Some(2_000), Some(4_000), true),
            (None, Some(1_500), None, false),
        ]
    );
    assert_eq!(result.annotations[1].source_name(), Some("Logs"));

    let alert_state = result.alert_state.unwrap();
    assert_eq!(alert_state.panel_id, 2);
    assert_eq!(alert_state.extra["evalData"], json!({ "noData": true }));
    assert_eq!(backend.alert_state_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_one_failing_source_empties_the_result() {
    let registry = StaticRegistry::new()
        .with_datasource("good", Arc::new(StaticDatasource(Ok(vec![tagged(None, 1, &["a"])]))))
        .with_datasource("bad", Arc::new(StaticDatasource(Err(Error::Internal("timeout".into())))));
    let service = AnnotationsService::new(Arc::new(FakeBackend::default()), Arc::new(registry));
    let mut notifications = service.subscribe();

    let dashboard = Dashboard {
        uid: Some("ops".into()),
        annotations: AnnotationList {
            list: vec![source("Good", "good"), source("Bad", "bad")],
        },
        ..Default::default()
    };
    let result = service.get_annotations(&live_query(dashboard, PanelRef::new(1))).await;

    assert!(result.annotations.is_empty());
    assert!(result.alert_state.is_none());
    match notifications.recv().await.unwrap() {
        AppEvent::AlertError { title, message } => {
            assert_eq!(title, "Annotation Query Failed");
            assert!(message.contains("timeout"));
        }
    }
}

#[tokio::test]
async fn test_built_in_datasource_round_trip_with_refresh() {
    let backend = Arc::new(FakeBackend {
        stored: vec![tagged(Some(1), 100, &["deploy"])],
        ..Default::default()
    });
    let registry = StaticRegistry::new()
        .with_datasource(BUILT_IN_DATASOURCE, Arc::new(BuiltInDatasource::new(backend.clone(), 50)))
        .with_default(BUILT_IN_DATASOURCE);
    let service = AnnotationsService::new(backend.clone(), Arc::new(registry));

    let dashboard = Dashboard {
        id: Some(9),
        uid: Some("ops".into()),
        annotations: AnnotationList {
            list: vec![AnnotationSource {
                name: "Annotations & Alerts".into(),
                enable: true,
                source_type: Some("dashboard".into()),
                ..Default::default()
            }],
        },
        ..Default::default()
    };
    let (refresh_tx, refresh_rx) = broadcast::channel(8);
    service.init(&dashboard, refresh_rx).await;

    let query = live_query(dashboard, PanelRef::new(1));
    assert_eq!(service.get_annotations(&query).await.annotations.len(), 1);
    assert_eq!(service.get_annotations(&query).await.annotations.len(), 1);
    assert_eq!(backend.searches.lock().unwrap().len(), 1);
    assert_eq!(backend.searches.lock().unwrap()[0].dashboard_id, Some(9));

    refresh_tx.send(DashboardEvent::Refresh).unwrap();
    while backend.searches.lock().unwrap().len() < 2 {
        service.get_annotations(&query).await;
        tokio::task::yield_now().await;
    }

    service
        .delete(&AnnotationEvent {
            id: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    service.get_annotations(&query).await;
    assert_eq!(backend.searches.lock().unwrap().len(), 3);
    assert_eq!(backend.writes.lock().unwrap().clone(), vec!["delete 1".to_string()]);
}

#[tokio::test]
async fn test_refresh_after_new_dashboard_is_saved() {
    let backend = Arc::new(FakeBackend {
        stored: vec![tagged(Some(1), 100, &["deploy"])],
        ..Default::default()
    });
    let registry = StaticRegistry::new()
        .with_datasource(BUILT_IN_DATASOURCE, Arc::new(BuiltInDatasource::new(backend.clone(), 50)))
        .with_default(BUILT_IN_DATASOURCE);
    let service = AnnotationsService::new(backend.clone(), Arc::new(registry));

    let mut dashboard = Dashboard {
        annotations: AnnotationList {
            list: vec![AnnotationSource {
                name: "Annotations & Alerts".into(),
                enable: true,
                source_type: Some("dashboard".into()),
                ..Default::default()
            }],
        },
        ..Default::default()
    };
    let (refresh_tx, refresh_rx) = broadcast::channel(8);
    service.init(&dashboard, refresh_rx).await;

    dashboard.id = Some(5);
    dashboard.uid = Some("fresh".into());
    let query = live_query(dashboard, PanelRef::new(1));
    service.get_annotations(&query).await;
    service.get_annotations(&query).await;
    assert_eq!(backend.searches.lock().unwrap().len(), 1);

    refresh_tx.send(DashboardEvent::Refresh).unwrap();
    for _ in 0..100 {
        if backend.searches.lock().unwrap().len() >= 2 {
            break;
        }
        tokio::task::yield_now().await;
        service.get_annotations(&query).await;
    }
    assert_eq!(backend.searches.lock().unwrap().len(), 2);
    assert_eq!(backend.searches.lock().unwrap()[1].dashboard_id, Some(5));
}
