//! Prometheus metrics for personalization-service.
//!
//! Exposes request, store, oracle and upstream-feed collectors and an HTTP
//! handler for the `/metrics` endpoint.

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Duration;

use crate::store::StoreHealth;

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "personalization_http_requests_total",
        "Total HTTP requests by method, path and status",
        &["method", "path", "status"]
    )
    .expect("Failed to register http requests metric")
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "personalization_http_request_duration_seconds",
        "HTTP request latency",
        &["method", "path"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register http duration metric")
});

static STORE_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "personalization_store_writes_total",
        "Store writes by component and outcome (persisted/degraded)",
        &["component", "outcome"]
    )
    .expect("Failed to register store writes metric")
});

static STORE_READ_FALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "personalization_store_read_fallbacks_total",
        "Store reads that fell back to defaults because the store failed",
        &["component"]
    )
    .expect("Failed to register store read fallbacks metric")
});

static STORE_HEALTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "personalization_store_health",
        "Store health (0=connected, 1=degraded, 2=disconnected)"
    )
    .expect("Failed to register store health metric")
});

static ORACLE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "personalization_oracle_requests_total",
        "Scoring oracle calls by operation and status",
        &["operation", "status"]
    )
    .expect("Failed to register oracle requests metric")
});

static ORACLE_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "personalization_oracle_latency_seconds",
        "Scoring oracle rank latency",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register oracle latency metric")
});

static SOURCE_FETCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "personalization_source_fetches_total",
        "Upstream article feed fetches by category and status",
        &["category", "status"]
    )
    .expect("Failed to register source fetches metric")
});

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(elapsed.as_secs_f64());
}

/// Record a store write outcome (persisted/degraded)
pub fn record_store_write(component: &str, outcome: &str) {
    STORE_WRITES_TOTAL
        .with_label_values(&[component, outcome])
        .inc();
}

pub fn record_store_read_fallback(component: &str) {
    STORE_READ_FALLBACKS_TOTAL
        .with_label_values(&[component])
        .inc();
}

pub fn set_store_health(health: StoreHealth) {
    let value = match health {
        StoreHealth::Connected => 0,
        StoreHealth::Degraded => 1,
        StoreHealth::Disconnected => 2,
    };
    STORE_HEALTH.set(value);
}

/// Record a scoring oracle call (success/error/timeout/rejected)
pub fn record_oracle_request(operation: &str, status: &str) {
    ORACLE_REQUESTS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

pub fn observe_oracle_latency(elapsed: Duration) {
    ORACLE_LATENCY_SECONDS.observe(elapsed.as_secs_f64());
}

pub fn record_source_fetch(category: &str, status: &str) {
    SOURCE_FETCHES_TOTAL
        .with_label_values(&[category, status])
        .inc();
}
