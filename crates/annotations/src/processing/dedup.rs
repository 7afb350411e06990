use std::collections::HashMap;

use crate::models::AnnotationEvent;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Id(i64),
    Content {
        time: Option<i64>,
        time_end: Option<i64>,
        tags: Vec<String>,
        panel_id: Option<i64>,
        source: Option<String>,
    },
}

impl DedupKey {
    fn of(event: &AnnotationEvent) -> Self {
        if let Some(id) = event.id {
            return DedupKey::Id(id);
        }
        let mut tags = event.tags.clone().unwrap_or_default();
        tags.sort();
        DedupKey::Content {
            time: event.time,
            time_end: event.time_end,
            tags,
            panel_id: event.panel_affinity(),
            source: event.source_name().map(str::to_string),
        }
    }
}

/// Remove duplicate events returned by overlapping source queries.
///
/// Events with a stored id are identified by it; everything else by time,
/// end time, tag set, panel and source. The first occurrence keeps its
/// position. When two copies of a stored annotation disagree on kind, the
/// non-alert copy wins the slot.
pub fn dedupe(events: Vec<AnnotationEvent>) -> Vec<AnnotationEvent> {
    let mut seen: HashMap<DedupKey, usize> = HashMap::with_capacity(events.len());
    let mut unique: Vec<AnnotationEvent> = Vec::with_capacity(events.len());

    for event in events {
        let key = DedupKey::of(&event);
        match seen.get(&key) {
            Some(&idx) => {
                if unique[idx].is_alert() && !event.is_alert() {
                    unique[idx] = event;
                }
            }
            None => {
                seen.insert(key, unique.len());
                unique.push(event);
            }
        }
    }

    unique
}
