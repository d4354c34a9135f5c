//! # Health Endpoints
//!
//! Liveness and readiness probes for the controller process.
//!
//! - `GET /healthz` answers 200 while the process runs
//! - `GET /readyz` answers 200 once the gateway cache is loaded, 503 before
//!
//! Both return a JSON [`HealthReport`].

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::apisix::cluster::ApisixClient;
use crate::core::error::{ControllerError, ControllerResult};

/// Status of the controller or one of its checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

/// Body of the probe endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub checks: BTreeMap<String, ServiceStatus>,
    pub version: String,
    /// Uptime in seconds
    pub uptime: u64,
}

impl HealthReport {
    /// Healthy only when every check is
    fn new(checks: BTreeMap<String, ServiceStatus>, uptime: u64) -> Self {
        let status = if checks.values().all(|s| *s == ServiceStatus::Healthy) {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };
        Self {
            status,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime,
        }
    }
}

#[derive(Clone)]
struct HealthState {
    apisix: Arc<ApisixClient>,
    started: Instant,
}

async fn healthz(State(state): State<HealthState>) -> Json<HealthReport> {
    Json(HealthReport::new(BTreeMap::new(), state.started.elapsed().as_secs()))
}

async fn readyz(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let cache = if state.apisix.is_ready() {
        ServiceStatus::Healthy
    } else {
        ServiceStatus::Unhealthy
    };
    let checks = BTreeMap::from([("apisix_cache".to_string(), cache)]);
    let report = HealthReport::new(checks, state.started.elapsed().as_secs());
    let code = match report.status {
        ServiceStatus::Healthy => StatusCode::OK,
        ServiceStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(report))
}

/// Router serving the probe endpoints
pub fn health_router(apisix: Arc<ApisixClient>) -> Router {
    let state = HealthState {
        apisix,
        started: Instant::now(),
    };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Serve the probe endpoints on `port` until cancelled
pub async fn serve_health(port: u16, apisix: Arc<ApisixClient>, cancel: CancellationToken) -> ControllerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::config(format!("Failed to bind health server: {}", e)))?;
    info!(address = %addr, "Health server listening");

    axum::serve(listener, health_router(apisix))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| ControllerError::internal(format!("Health server error: {}", e)))
}
