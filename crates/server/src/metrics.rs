//! Prometheus metrics for the HTTP surface.
//!
//! Engine metrics (sync, enrichment, notifier) live in the core crate and are
//! registered here alongside the HTTP and WebSocket ones.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

use moviecache_core::Collection;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "moviecache_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("moviecache_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "moviecache_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "moviecache_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "moviecache_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// Change events forwarded to WebSocket clients, by change kind.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "moviecache_ws_messages_sent_total",
            "Change events sent to WebSocket clients",
        ),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics (collected dynamically)
// =============================================================================

/// Rows per collection.
pub static COLLECTION_ROWS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("moviecache_collection_rows", "Current row count by collection"),
        &["collection"],
    )
    .unwrap()
});

/// Whether a sync cycle is running, by collection.
pub static SYNC_IN_FLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "moviecache_sync_in_flight",
            "Whether a sync cycle is running (1) or idle (0)",
        ),
        &["collection"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();

    // Cache
    registry
        .register(Box::new(COLLECTION_ROWS.clone()))
        .unwrap();
    registry
        .register(Box::new(SYNC_IN_FLIGHT.clone()))
        .unwrap();

    // Core metrics (sync, enrichment, notifier)
    for metric in moviecache_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges from the current cache state before encoding.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let cache = state.cache();

    for collection in Collection::ALL {
        if let Ok(count) = cache.count(collection).await {
            COLLECTION_ROWS
                .with_label_values(&[collection.table_name()])
                .set(count as i64);
        }
    }

    for sort_key in moviecache_core::SortKey::ALL {
        let status = cache.status(sort_key);
        SYNC_IN_FLIGHT
            .with_label_values(&[sort_key.collection().table_name()])
            .set(if status.in_flight { 1 } else { 0 });
    }
}

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    NUMERIC_SEGMENT.replace_all(path, "/{id}$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(
            normalize_path("/api/v1/movies/favorites/550"),
            "/api/v1/movies/favorites/{id}"
        );
    }

    #[test]
    fn test_normalize_path_numeric_middle() {
        assert_eq!(
            normalize_path("/api/v1/movies/550/enrich"),
            "/api/v1/movies/{id}/enrich"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/sync/status"), "/api/v1/sync/status");
        assert_eq!(normalize_path("/api/v1/movies/top_rated"), "/api/v1/movies/top_rated");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("moviecache_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        moviecache_core::metrics::SYNC_CYCLES
            .with_label_values(&["popular", "success"])
            .inc();
        COLLECTION_ROWS.with_label_values(&["favorites"]).set(0);
        WS_CONNECTIONS_TOTAL.inc();

        let output = encode_metrics();
        assert!(output.contains("moviecache_sync_cycles_total"));
        assert!(output.contains("moviecache_collection_rows"));
        assert!(output.contains("moviecache_ws_connections_total"));
    }
}
