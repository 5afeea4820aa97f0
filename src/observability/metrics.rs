//! Metrics collection and exposition.
//!
//! # Metrics
//! - `xds_snapshots_published_total` (counter): publishes by node group
//! - `xds_snapshot_conflicts_total` (counter): publishes refused as same-version
//! - `xds_responses_total` (counter): responses sent by type and mode
//! - `xds_acks_total` / `xds_nacks_total` (counter): client verdicts by type
//! - `xds_stream_rejections_total` (counter): malformed requests by reason
//! - `xds_active_streams` (gauge): current discovery stream count

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resources::ResourceType;
use crate::subscription::DeliveryMode;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_snapshot_published(node_group: &str) {
    metrics::counter!("xds_snapshots_published_total", "node_group" => node_group.to_string())
        .increment(1);
}

pub fn record_snapshot_conflict(node_group: &str) {
    metrics::counter!("xds_snapshot_conflicts_total", "node_group" => node_group.to_string())
        .increment(1);
}

pub fn record_response(resource_type: ResourceType, mode: DeliveryMode) {
    let mode = match mode {
        DeliveryMode::StateOfTheWorld => "sotw",
        DeliveryMode::Delta => "delta",
    };
    metrics::counter!(
        "xds_responses_total",
        "type" => resource_type.short_name(),
        "mode" => mode
    )
    .increment(1);
}

pub fn record_ack(resource_type: ResourceType) {
    metrics::counter!("xds_acks_total", "type" => resource_type.short_name()).increment(1);
}

pub fn record_nack(resource_type: ResourceType) {
    metrics::counter!("xds_nacks_total", "type" => resource_type.short_name()).increment(1);
}

pub fn record_rejection(reason: &'static str) {
    metrics::counter!("xds_stream_rejections_total", "reason" => reason).increment(1);
}

pub fn record_active_streams(active: u64) {
    metrics::gauge!("xds_active_streams").set(active as f64);
}
