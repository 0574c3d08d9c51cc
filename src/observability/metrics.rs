//! Metrics collection and exposition.
//!
//! # Metrics
//! - `engine_connections_accepted_total` (counter): admitted connections
//! - `engine_connections_rejected_total` (counter): refused by the per-IP ceiling
//! - `engine_connections_active` (gauge): live connections per worker loop
//! - `engine_connection_errors_total` (counter): pipeline failures by kind
//! - `engine_upgrades_total` (counter): connections handed to an upgrade handler
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels stay low-cardinality (worker index, error kind)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    counter!("engine_connections_accepted_total").increment(1);
}

pub fn record_connection_rejected() {
    counter!("engine_connections_rejected_total").increment(1);
}

pub fn record_connection_opened(worker: usize) {
    gauge!("engine_connections_active", "worker" => worker.to_string()).increment(1.0);
}

pub fn record_connection_closed(worker: usize) {
    gauge!("engine_connections_active", "worker" => worker.to_string()).decrement(1.0);
}

pub fn record_connection_error(kind: &'static str) {
    counter!("engine_connection_errors_total", "kind" => kind).increment(1);
}

pub fn record_upgrade() {
    counter!("engine_upgrades_total").increment(1);
}
