//! Prometheus counters of the pipeline.
//!
//! Counters are process-wide statics; [`register_custom_metrics`] adds them to
//! a registry (the crate's [`REGISTRY`] by default) and
//! [`gather_text`] renders that registry in the text exposition format.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;

lazy_static! {
    pub static ref DISPATCHED_ENTRIES: IntCounter =
        IntCounter::new("dispatched_entries", "Entries delivered by the dispatch loop")
            .expect("metric can not be created");

    pub static ref HANDLER_FAULTS: IntCounterVec = IntCounterVec::new(
        Opts::new("handler_faults", "Handlers removed after a failure"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref CONFIGURATIONS_APPLIED: IntCounter =
        IntCounter::new("configurations_applied", "Configuration snapshots applied by the dispatch loop")
            .expect("metric can not be created");

    pub static ref SENDER_LOST_ENTRIES: IntCounterVec = IntCounterVec::new(
        Opts::new("sender_lost_entries", "Entries evicted from a sender buffer before delivery"),
        &["sink"]
    )
    .expect("metric can not be created");

    pub static ref POOL_DROPPED_ENTRIES: IntCounter =
        IntCounter::new("pool_dropped_entries", "Released records abandoned above the pool hard capacity")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER_DEFAULT: Once = Once::new();

pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(DISPATCHED_ENTRIES.clone()),
        Box::new(HANDLER_FAULTS.clone()),
        Box::new(CONFIGURATIONS_APPLIED.clone()),
        Box::new(SENDER_LOST_ENTRIES.clone()),
        Box::new(POOL_DROPPED_ENTRIES.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("metric registration skipped: {}", e);
        }
    }
}

/// Registers the counters in [`REGISTRY`], once per process.
pub fn register_default() {
    REGISTER_DEFAULT.call_once(|| register_custom_metrics(&REGISTRY));
}

/// Text exposition of [`REGISTRY`].
pub fn gather_text() -> String {
    register_default();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
