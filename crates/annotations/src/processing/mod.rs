//! Annotation Processing
//!
//! Pure stages applied to the flattened fetch results, in order:
//! panel relevance, dedup, template-variable filtering and region pairing.

mod dedup;
mod regions;
mod variables;

pub use dedup::dedupe;
pub use regions::pair_regions;
pub use variables::filter_by_variables;

use crate::models::{AnnotationEvent, PanelRef};

/// Keep only the events that belong on the requesting panel.
pub fn filter_for_panel(events: Vec<AnnotationEvent>, panel: &PanelRef) -> Vec<AnnotationEvent> {
    events
        .into_iter()
        .filter(|event| is_relevant(event, panel))
        .collect()
}

fn is_relevant(event: &AnnotationEvent, panel: &PanelRef) -> bool {
    let source = event.source.as_deref();
    let match_dashboards = source.map(|s| s.match_dashboards).unwrap_or(false);

    if panel.is_annotations_list() && match_dashboards {
        return true;
    }

    let scoped = match_dashboards || source.map(|s| s.is_dashboard_scoped()).unwrap_or(false);
    match event.panel_affinity() {
        Some(panel_id) if scoped => panel_id == panel.id,
        _ => true,
    }
}
