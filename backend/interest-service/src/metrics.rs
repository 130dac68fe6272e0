//! Interest Service Metrics
//!
//! Prometheus counters for event dispatch, profile writes and recommendations

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::time::Duration;

static EVENTS_DISPATCHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "interest_events_dispatched_total",
        "Interaction events seen by the dispatcher, by kind and outcome",
        &["kind", "outcome"]
    )
    .expect("Failed to register interest events dispatched metric")
});

static MISSING_EMBEDDINGS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "interest_missing_embeddings_total",
        "Interactions skipped for the profile because the content has no embedding"
    )
    .expect("Failed to register interest missing embeddings metric")
});

static PROFILE_CAS_CONFLICTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "interest_profile_cas_conflicts_total",
        "Optimistic profile writes that lost the race (retried or exhausted)",
        &["result"]
    )
    .expect("Failed to register interest profile CAS conflicts metric")
});

static RECOMMEND_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "interest_recommend_duration_seconds",
        "Duration of recommendation requests",
        &["result"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("Failed to register interest recommend duration metric")
});

/// Record a dispatched event (`applied`, `partial`, `retryable`, `duplicate`, `rejected`)
pub fn record_event(kind: &str, outcome: &str) {
    EVENTS_DISPATCHED_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();
}

pub fn record_missing_embedding() {
    MISSING_EMBEDDINGS_TOTAL.inc();
}

/// Record a lost CAS race (`retried` or `exhausted`)
pub fn record_cas_conflict(result: &str) {
    PROFILE_CAS_CONFLICTS_TOTAL.with_label_values(&[result]).inc();
}

/// Record recommendation latency (`ranked`, `cold_start`, `empty`)
pub fn record_recommend(result: &str, duration: Duration) {
    RECOMMEND_DURATION_SECONDS
        .with_label_values(&[result])
        .observe(duration.as_secs_f64());
}
