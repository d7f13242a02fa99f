//! Metrics collection and exposition.
//!
//! # Metrics
//! - `addon_host_connections_total` (counter): accepted connections by port
//! - `addon_host_active_connections` (gauge): connections being processed, by port
//! - `addon_host_connection_failures_total` (counter): processors that failed or panicked, by port
//! - `addon_host_addons_running` (gauge): initialized addons

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_opened(port: u16) {
    let port = port.to_string();
    metrics::counter!("addon_host_connections_total", "port" => port.clone()).increment(1);
    metrics::gauge!("addon_host_active_connections", "port" => port).increment(1.0);
}

pub fn record_connection_closed(port: u16, failed: bool) {
    let port = port.to_string();
    metrics::gauge!("addon_host_active_connections", "port" => port.clone()).decrement(1.0);
    if failed {
        metrics::counter!("addon_host_connection_failures_total", "port" => port).increment(1);
    }
}

pub fn record_addons_running(count: usize) {
    metrics::gauge!("addon_host_addons_running").set(count as f64);
}
