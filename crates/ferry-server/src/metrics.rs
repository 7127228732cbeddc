//! Metrics collection and export for Ferry.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use ferry_protocol::RenderMethod;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const RESOLUTIONS_TOTAL: &str = "ferry_resolutions_total";
    pub const RESOLUTION_SECONDS: &str = "ferry_resolution_seconds";
    pub const LIVE_CHANNELS_TOTAL: &str = "ferry_live_channels_total";
    pub const LIVE_CHANNELS_ACTIVE: &str = "ferry_live_channels_active";
    pub const BROADCASTS_TOTAL: &str = "ferry_broadcasts_total";
    pub const STUB_REGENERATIONS_TOTAL: &str = "ferry_stub_regenerations_total";
    pub const ERRORS_TOTAL: &str = "ferry_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::RESOLUTIONS_TOTAL,
        "Route resolutions by effective render method"
    );
    metrics::describe_histogram!(
        names::RESOLUTION_SECONDS,
        "Route resolution latency in seconds"
    );
    metrics::describe_counter!(
        names::LIVE_CHANNELS_TOTAL,
        "Total number of live channels since server start"
    );
    metrics::describe_gauge!(
        names::LIVE_CHANNELS_ACTIVE,
        "Current number of open live channels"
    );
    metrics::describe_counter!(names::BROADCASTS_TOTAL, "Commands broadcast to live channels");
    metrics::describe_counter!(
        names::STUB_REGENERATIONS_TOTAL,
        "Cross-realm stubs regenerated"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a finished resolution.
pub fn record_resolution(method: RenderMethod, seconds: f64) {
    counter!(names::RESOLUTIONS_TOTAL, "method" => method.as_str()).increment(1);
    histogram!(names::RESOLUTION_SECONDS).record(seconds);
}

/// Record a broadcast command.
pub fn record_broadcast(command: &'static str) {
    counter!(names::BROADCASTS_TOTAL, "command" => command).increment(1);
}

/// Record a regenerated stub.
pub fn record_stub_regeneration() {
    counter!(names::STUB_REGENERATIONS_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records the end of a live channel on drop.
pub struct LiveChannelGuard;

impl LiveChannelGuard {
    /// Create a new metrics guard, recording an opened channel.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::LIVE_CHANNELS_TOTAL).increment(1);
        gauge!(names::LIVE_CHANNELS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for LiveChannelGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LiveChannelGuard {
    fn drop(&mut self) {
        gauge!(names::LIVE_CHANNELS_ACTIVE).decrement(1.0);
    }
}
