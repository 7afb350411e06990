use std::collections::HashMap;

use crate::models::{AnnotationEvent, TimeRange};

/// Collapse region start/end events into single region entries.
///
/// Events sharing a region id become one entry spanning from the first
/// member's time to the second member's time. A lone member that is missing
/// a bound was cut by the visible range and is clamped to it. Regions are
/// returned first, followed by point events in their original order.
pub fn pair_regions(events: Vec<AnnotationEvent>, range: &TimeRange) -> Vec<AnnotationEvent> {
    let mut groups: Vec<Vec<AnnotationEvent>> = Vec::new();
    let mut group_index: HashMap<i64, usize> = HashMap::new();
    let mut points = Vec::new();

    for event in events {
        match event.region() {
            Some(region_id) => {
                let idx = *group_index.entry(region_id).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[idx].push(event);
            }
            None => points.push(event),
        }
    }

    let mut paired: Vec<AnnotationEvent> = groups
        .into_iter()
        .filter_map(|members| merge_region(members, range))
        .collect();
    paired.extend(points);
    paired
}

fn merge_region(members: Vec<AnnotationEvent>, range: &TimeRange) -> Option<AnnotationEvent> {
    let mut members = members.into_iter();
    let mut region = members.next()?;

    if let Some(end) = members.next() {
        region.time_end = end.time;
        region.is_region = true;
        return Some(region);
    }

    if region.time.is_none() || region.time_end.is_none() {
        if is_region_start(&region) {
            region.time_end = Some(range.to_millis() - 1);
        } else {
            region.time = Some(range.from_millis() + 1);
        }
        region.is_region = true;
    }
    Some(region)
}

fn is_region_start(event: &AnnotationEvent) -> bool {
    matches!((event.id, event.region()), (Some(id), Some(region_id)) if id == region_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn range() -> TimeRange {
        TimeRange::absolute(
            Utc.timestamp_millis_opt(1_000).unwrap(),
            Utc.timestamp_millis_opt(9_000).unwrap(),
        )
    }

    fn member(id: i64, region_id: i64, time: Option<i64>) -> AnnotationEvent {
        AnnotationEvent {
            id: Some(id),
            region_id: Some(region_id),
            time,
            tags: Some(vec!["r".into()]),
            ..Default::default()
        }
    }

    fn point(id: i64, time: i64) -> AnnotationEvent {
        AnnotationEvent {
            id: Some(id),
            time: Some(time),
            ..Default::default()
        }
    }

    #[test]
    fn test_pairs_start_and_end() {
        let events = vec![point(1, 50), member(10, 10, Some(2_000)), member(11, 10, Some(4_000))];
        let result = pair_regions(events, &range());

        assert_eq!(result.len(), 2);
        let region = &result[0];
        assert_eq!(region.id, Some(10));
        assert_eq!(region.time, Some(2_000));
        assert_eq!(region.time_end, Some(4_000));
        assert!(region.is_region);
        assert_eq!(result[1], point(1, 50));
    }

    #[test]
    fn test_cut_region_start_extends_to_range_end() {
        let result = pair_regions(vec![member(10, 10, Some(2_000))], &range());
        assert_eq!(result[0].time, Some(2_000));
        assert_eq!(result[0].time_end, Some(8_999));
        assert!(result[0].is_region);
    }

    #[test]
    fn test_cut_region_end_starts_at_range_start() {
        let mut end = member(11, 10, None);
        end.time_end = Some(5_000);
        let result = pair_regions(vec![end], &range());
        assert_eq!(result[0].time, Some(1_001));
        assert_eq!(result[0].time_end, Some(5_000));
        assert!(result[0].is_region);
    }

    #[test]
    fn test_complete_lone_region_left_alone() {
        let mut whole = member(10, 10, Some(2_000));
        whole.time_end = Some(3_000);
        let result = pair_regions(vec![whole.clone()], &range());
        assert_eq!(result, vec![whole]);
    }

    #[test]
    fn test_points_keep_their_order() {
        let events = vec![point(3, 30), point(1, 10), point(2, 20)];
        let result = pair_regions(events.clone(), &range());
        assert_eq!(result, events);
    }
}
