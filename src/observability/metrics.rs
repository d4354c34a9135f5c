//! # Controller Metrics
//!
//! Counters and histograms recorded by the controllers and the gateway client,
//! exported in the Prometheus text format.
//!
//! ## Metrics
//! - `apisix_ingress_controller_events_total{resource, operation}`
//! - `apisix_ingress_controller_sync_operation_total{resource, result}`
//! - `apisix_ingress_controller_apisix_requests_total{resource, method, status}`
//! - `apisix_ingress_controller_apisix_request_duration_seconds{resource, method}`
//! - `apisix_ingress_controller_status_updates_total{resource, result}`
//! - `apisix_ingress_controller_queue_depth{resource}`
//! - `apisix_ingress_controller_cache_sync_total{resource, result}`
//!
//! ## Usage Example
//! ```rust,ignore
//! let metrics = ControllerMetrics::new();
//! metrics.record_event("ApisixRoute", EventType::Add);
//! metrics.record_sync_operation("ApisixRoute", SyncResult::Success);
//! ```

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

use crate::core::config::MetricsConfig;
use crate::core::error::{ControllerError, ControllerResult};
use crate::core::types::EventType;

const EVENTS_TOTAL: &str = "apisix_ingress_controller_events_total";
const SYNC_OPERATION_TOTAL: &str = "apisix_ingress_controller_sync_operation_total";
const APISIX_REQUESTS_TOTAL: &str = "apisix_ingress_controller_apisix_requests_total";
const APISIX_REQUEST_DURATION: &str = "apisix_ingress_controller_apisix_request_duration_seconds";
const STATUS_UPDATES_TOTAL: &str = "apisix_ingress_controller_status_updates_total";
const QUEUE_DEPTH: &str = "apisix_ingress_controller_queue_depth";
const CACHE_SYNC_TOTAL: &str = "apisix_ingress_controller_cache_sync_total";

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Outcome of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    Success,
    Failure,
}

impl SyncResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Handle used to record controller metrics
///
/// Recording goes through the global `metrics` recorder, so the handle is
/// free to clone and works (as a no-op) when no exporter is installed.
#[derive(Debug, Clone, Default)]
pub struct ControllerMetrics;

impl ControllerMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Count a notification accepted by a controller
    pub fn record_event(&self, resource: &str, operation: EventType) {
        metrics::counter!(
            EVENTS_TOTAL,
            "resource" => resource.to_string(),
            "operation" => operation.as_str()
        )
        .increment(1);
    }

    /// Count the result of one reconciliation
    pub fn record_sync_operation(&self, resource: &str, result: SyncResult) {
        metrics::counter!(
            SYNC_OPERATION_TOTAL,
            "resource" => resource.to_string(),
            "result" => result.as_str()
        )
        .increment(1);
    }

    /// Record one admin API call
    ///
    /// `status` is `None` when the request failed before a response arrived.
    pub fn record_apisix_request(&self, resource: &str, method: &str, status: Option<u16>, duration: Duration) {
        let status = status.map(|s| s.to_string()).unwrap_or_else(|| "error".to_string());
        metrics::counter!(
            APISIX_REQUESTS_TOTAL,
            "resource" => resource.to_string(),
            "method" => method.to_string(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            APISIX_REQUEST_DURATION,
            "resource" => resource.to_string(),
            "method" => method.to_string()
        )
        .record(duration.as_secs_f64());
    }

    pub fn record_status_update(&self, resource: &str, result: SyncResult) {
        metrics::counter!(
            STATUS_UPDATES_TOTAL,
            "resource" => resource.to_string(),
            "result" => result.as_str()
        )
        .increment(1);
    }

    pub fn set_queue_depth(&self, resource: &str, depth: usize) {
        metrics::gauge!(QUEUE_DEPTH, "resource" => resource.to_string()).set(depth as f64);
    }

    pub fn record_cache_sync(&self, resource: &str, result: SyncResult) {
        metrics::counter!(
            CACHE_SYNC_TOTAL,
            "resource" => resource.to_string(),
            "result" => result.as_str()
        )
        .increment(1);
    }
}

/// Install the global Prometheus recorder and its HTTP listener
pub fn install_prometheus_exporter(config: &MetricsConfig) -> ControllerResult<()> {
    if !config.enabled {
        tracing::info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(APISIX_REQUEST_DURATION.to_string()), LATENCY_BUCKETS)
        .map_err(|e| ControllerError::config(format!("Failed to set histogram buckets: {}", e)))?
        .install()
        .map_err(|e| ControllerError::internal(format!("Failed to install metrics exporter: {}", e)))?;

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}
