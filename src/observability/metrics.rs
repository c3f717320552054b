//! Metrics collection and exposition.
//!
//! # Metrics
//! - `greetbot_webhook_requests_total` (counter): webhook responses by status
//! - `greetbot_webhook_rejections_total` (counter): admission rejections by reason
//! - `greetbot_events_dispatched_total` (counter): dispatch outcomes by kind
//!   (`app_mention` or `other`)
//! - `greetbot_active_connections` (gauge): open client connections
//! - `greetbot_shutdowns_total` (counter): shutdown sequences by trigger
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::events::dispatch::APP_MENTION;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_response(status: u16) {
    counter!("greetbot_webhook_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_rejection(reason: &'static str) {
    counter!("greetbot_webhook_rejections_total", "reason" => reason).increment(1);
}

pub fn record_dispatch(kind: &str, outcome: &'static str) {
    counter!(
        "greetbot_events_dispatched_total",
        "kind" => dispatch_kind_label(kind),
        "outcome" => outcome
    )
    .increment(1);
}

/// Payload kinds are sender-controlled, so only handled kinds get their own label.
pub fn dispatch_kind_label(kind: &str) -> &'static str {
    match kind {
        APP_MENTION => APP_MENTION,
        _ => "other",
    }
}

pub fn connection_opened() {
    gauge!("greetbot_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("greetbot_active_connections").decrement(1.0);
}

pub fn record_shutdown(reason: &'static str) {
    counter!("greetbot_shutdowns_total", "reason" => reason).increment(1);
}
