use lazy_static::lazy_static;
use prometheus::{core::Collector, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ANNOTATION_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "annotations_fetches_total",
            "Backend fetches issued, by kind (global, alert_states)."
        ),
        &["kind"]
    )
    .unwrap();
    pub static ref ANNOTATION_CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "annotations_cache_hits_total",
            "Requests answered from a pending or ready cache entry, by kind."
        ),
        &["kind"]
    )
    .unwrap();
    pub static ref ANNOTATION_QUERY_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "annotations_query_failures_total",
        "Annotation queries that degraded to an empty result."
    )
    .unwrap();
}

fn collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(ANNOTATION_FETCHES_TOTAL.clone()),
        Box::new(ANNOTATION_CACHE_HITS_TOTAL.clone()),
        Box::new(ANNOTATION_QUERY_FAILURES_TOTAL.clone()),
    ]
}

/// Register the crate's metrics with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_metrics() -> Result<()> {
    for collector in collectors() {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))
}
