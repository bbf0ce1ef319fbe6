//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): time to response head
//! - `gateway_connect_errors_total` (counter): failed connect attempts by kind
//! - `gateway_connect_retries_total` (counter): connect retries
//! - `gateway_sessions_active` (gauge): sessions in the table
//! - `gateway_session_events_total` (counter): created/reused/terminated/expired
//! - `gateway_stream_bytes_total` (counter): response body bytes by route

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_connect_error(kind: &'static str) {
    counter!("gateway_connect_errors_total", "kind" => kind).increment(1);
}

pub fn record_connect_retry() {
    counter!("gateway_connect_retries_total").increment(1);
}

pub fn set_sessions_active(count: usize) {
    gauge!("gateway_sessions_active").set(count as f64);
}

pub fn record_session_event(event: &'static str) {
    counter!("gateway_session_events_total", "event" => event).increment(1);
}

pub fn record_stream_bytes(route: &str, bytes: u64) {
    counter!("gateway_stream_bytes_total", "route" => route.to_string()).increment(bytes);
}
