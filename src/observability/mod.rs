// Prometheus metrics
pub mod metrics;

// Structured logging
pub mod logging;

// Liveness and readiness endpoints
pub mod health;

pub use health::{health_router, serve_health, HealthReport, ServiceStatus};
pub use logging::init_logging;
pub use metrics::{install_prometheus_exporter, ControllerMetrics, SyncResult};
