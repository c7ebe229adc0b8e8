//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Sync cycles (results, durations, skipped rows)
//! - Enrichment runs
//! - Change notification fan-out

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Sync Metrics
// =============================================================================

/// Sync cycles total by collection and result.
pub static SYNC_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("moviecache_sync_cycles_total", "Total sync cycles"),
        &["collection", "result"], // "success", "failed", "cancelled"
    )
    .unwrap()
});

/// Sync cycle duration in seconds.
pub static SYNC_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "moviecache_sync_duration_seconds",
            "Duration of sync cycles",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["collection"],
    )
    .unwrap()
});

/// Rows skipped during bulk replace because of duplicate movie ids.
pub static ROWS_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "moviecache_rows_skipped_total",
            "Rows skipped on bulk replace due to duplicate movie ids",
        ),
        &["collection"],
    )
    .unwrap()
});

// =============================================================================
// Enrichment Metrics
// =============================================================================

/// Enrichment runs by kind and outcome.
pub static ENRICHMENT_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("moviecache_enrichment_runs_total", "Total enrichment runs"),
        &["kind", "outcome"], // kind: "trailer", "reviews"
    )
    .unwrap()
});

// =============================================================================
// Notifier Metrics
// =============================================================================

/// Change events emitted by kind.
pub static CHANGE_EVENTS_EMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "moviecache_change_events_total",
            "Total change events emitted",
        ),
        &["kind"],
    )
    .unwrap()
});

/// Live change subscriptions.
pub static ACTIVE_SUBSCRIPTIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "moviecache_active_subscriptions",
        "Number of live change subscriptions",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Sync
        Box::new(SYNC_CYCLES.clone()),
        Box::new(SYNC_DURATION.clone()),
        Box::new(ROWS_SKIPPED.clone()),
        // Enrichment
        Box::new(ENRICHMENT_RUNS.clone()),
        // Notifier
        Box::new(CHANGE_EVENTS_EMITTED.clone()),
        Box::new(ACTIVE_SUBSCRIPTIONS.clone()),
    ]
}
