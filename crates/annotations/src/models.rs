use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Selection sentinel meaning "every option of the variable".
pub const ALL_VALUE: &str = "$__all";

/// Raw range bound that marks a live, open-ended view.
pub const NOW: &str = "now";

// Annotation source configured on a dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSource {
    pub name: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default)]
    pub match_dashboards: bool,
    #[serde(default)]
    pub filter_by_variable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_data: Option<Vec<AnnotationEvent>>,
}

impl AnnotationSource {
    pub fn is_dashboard_scoped(&self) -> bool {
        self.source_type.as_deref() == Some("dashboard")
    }

    /// Copy of this source used as the provenance reference on events,
    /// without the (potentially large) snapshot payload.
    pub fn without_snapshot(&self) -> Self {
        Self {
            snapshot_data: None,
            ..self.clone()
        }
    }
}

/// A per-variable annotation filter, derived from an annotation source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationFilterRule {
    pub name: String,
    pub enable: bool,
    pub filter_by_variable: bool,
}

impl From<&AnnotationSource> for AnnotationFilterRule {
    fn from(source: &AnnotationSource) -> Self {
        Self {
            name: source.name.clone(),
            enable: source.enable,
            filter_by_variable: source.filter_by_variable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub is_region: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip)]
    pub source: Option<Arc<AnnotationSource>>,
}

impl AnnotationEvent {
    /// Panel id, treating the API's `0` placeholder as "no panel".
    pub fn panel_affinity(&self) -> Option<i64> {
        self.panel_id.filter(|id| *id != 0)
    }

    /// Region id, treating the API's `0` placeholder as "not a region member".
    pub fn region(&self) -> Option<i64> {
        self.region_id.filter(|id| *id != 0)
    }

    pub fn is_alert(&self) -> bool {
        self.event_type.as_deref() == Some("alert")
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_deref().map(|s| s.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

impl Default for VariableValue {
    fn default() -> Self {
        VariableValue::Multi(Vec::new())
    }
}

impl VariableValue {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            VariableValue::Single(value) => vec![value.clone()],
            VariableValue::Multi(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableCurrent {
    #[serde(default)]
    pub value: VariableValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableOption {
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(default)]
    pub current: VariableCurrent,
    #[serde(default)]
    pub options: Vec<VariableOption>,
}

impl TemplateVariable {
    /// Currently selected values with `$__all` expanded to every option.
    pub fn selected_values(&self) -> Vec<String> {
        let selected = self.current.value.to_vec();
        if selected.first().map(String::as_str) == Some(ALL_VALUE) {
            return self
                .options
                .iter()
                .map(|o| o.value.clone())
                .filter(|v| v != ALL_VALUE)
                .collect();
        }
        selected
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub dashboard_id: i64,
    pub panel_id: i64,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationList {
    #[serde(default)]
    pub list: Vec<AnnotationSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Templating {
    #[serde(default)]
    pub list: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub snapshot: bool,
    #[serde(default)]
    pub annotations: AnnotationList,
    #[serde(default)]
    pub templating: Templating,
}

impl Dashboard {
    /// Identity used to scope cached results to one dashboard view.
    pub fn session_key(&self) -> String {
        match (&self.uid, self.id) {
            (Some(uid), _) => uid.clone(),
            (None, Some(id)) => format!("id:{}", id),
            (None, None) => "unsaved".to_string(),
        }
    }

    pub fn filter_rules(&self) -> Vec<AnnotationFilterRule> {
        self.annotations.list.iter().map(AnnotationFilterRule::from).collect()
    }

    pub fn variables(&self) -> &[TemplateVariable] {
        &self.templating.list
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelRef {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl PanelRef {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn has_alert(&self) -> bool {
        matches!(&self.alert, Some(alert) if !alert.is_null())
    }

    /// Annotation list panels show annotations from every panel.
    pub fn is_annotations_list(&self) -> bool {
        self.transform.as_deref() == Some("annotations")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTimeRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub raw: RawTimeRange,
}

impl TimeRange {
    /// Live range ending at `now`, e.g. `last(Duration::hours(6))` for `now-6h`.
    pub fn last(span: Duration) -> Self {
        let to = Utc::now();
        Self {
            from: to - span,
            to,
            raw: RawTimeRange {
                from: format!("now-{}s", span.num_seconds()),
                to: NOW.to_string(),
            },
        }
    }

    /// Fixed range; neither bound is relative to `now`.
    pub fn absolute(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            raw: RawTimeRange {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            },
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.raw.to == NOW
    }

    pub fn from_millis(&self) -> i64 {
        self.from.timestamp_millis()
    }

    pub fn to_millis(&self) -> i64 {
        self.to.timestamp_millis()
    }
}

/// What a panel asks for when it wants its annotations.
#[derive(Debug, Clone)]
pub struct AnnotationQuery {
    pub panel: PanelRef,
    pub dashboard: Arc<Dashboard>,
    pub range: TimeRange,
}
