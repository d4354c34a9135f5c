//! # Configuration Module
//!
//! Configuration for the ingress controller process.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Human readable durations (`30s`, `6h`) via `humantime_serde`
//! - Environment variable overrides (`APISIX_INGRESS_<SECTION>_<FIELD>`)
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{ControllerError, ControllerResult};

/// Environment variable holding the configuration file path
pub const CONFIG_PATH_ENV: &str = "APISIX_INGRESS_CONFIG_PATH";

/// Configuration file used when `APISIX_INGRESS_CONFIG_PATH` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/controller.yaml";

/// Main controller configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Kubernetes connection and watch settings
    pub kubernetes: KubernetesConfig,

    /// Gateway admin API settings
    pub apisix: ApisixConfig,

    /// Work queue and retry settings
    pub controller: ReconcileConfig,

    /// Logging, metrics and health endpoints
    pub observability: ObservabilityConfig,
}

impl ControllerConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ControllerResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ControllerError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: ControllerConfig = serde_yaml::from_str(&content)
            .map_err(|e| ControllerError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> ControllerResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ControllerError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: ControllerConfig = serde_json::from_str(&content)
            .map_err(|e| ControllerError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration for the running process
    ///
    /// Reads the file named by `APISIX_INGRESS_CONFIG_PATH` (or the default
    /// path). A missing file is not an error: defaults plus environment
    /// overrides are used instead.
    pub async fn load() -> ControllerResult<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            if path.ends_with(".json") {
                return Self::load_from_json(&path).await;
            }
            return Self::load_from_file(&path).await;
        }

        tracing::info!(path = %path, "Config file not found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: APISIX_INGRESS_<SECTION>_<FIELD>
    /// For example: APISIX_INGRESS_ADMIN_BASE_URL=http://apisix-admin:9180/apisix/admin
    pub fn apply_env_overrides(&mut self) -> ControllerResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ControllerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn invalid<E: std::fmt::Display>(name: &str, e: E) -> ControllerError {
            ControllerError::config(format!("Invalid {}: {}", name, e))
        }

        // Kubernetes overrides
        if let Some(path) = lookup("APISIX_INGRESS_KUBECONFIG") {
            self.kubernetes.kubeconfig_path = Some(path);
        }

        if let Some(namespaces) = lookup("APISIX_INGRESS_WATCHED_NAMESPACES") {
            self.kubernetes.watched_namespaces = namespaces
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(class) = lookup("APISIX_INGRESS_INGRESS_CLASS") {
            self.kubernetes.ingress_class = class;
        }

        if let Some(interval) = lookup("APISIX_INGRESS_RESYNC_INTERVAL") {
            self.kubernetes.resync_interval = humantime::parse_duration(&interval)
                .map_err(|e| invalid("APISIX_INGRESS_RESYNC_INTERVAL", e))?;
        }

        if let Some(enabled) = lookup("APISIX_INGRESS_ENABLE_GATEWAY_API") {
            self.kubernetes.enable_gateway_api = enabled
                .parse()
                .map_err(|e| invalid("APISIX_INGRESS_ENABLE_GATEWAY_API", e))?;
        }

        // Admin API overrides
        if let Some(url) = lookup("APISIX_INGRESS_ADMIN_BASE_URL") {
            self.apisix.admin_base_url = url;
        }

        if let Some(key) = lookup("APISIX_INGRESS_ADMIN_KEY") {
            self.apisix.admin_key = key;
        }

        if let Some(timeout) = lookup("APISIX_INGRESS_ADMIN_TIMEOUT") {
            self.apisix.timeout = humantime::parse_duration(&timeout)
                .map_err(|e| invalid("APISIX_INGRESS_ADMIN_TIMEOUT", e))?;
        }

        // Reconcile overrides
        if let Some(workers) = lookup("APISIX_INGRESS_WORKERS") {
            self.controller.workers = workers
                .parse()
                .map_err(|e| invalid("APISIX_INGRESS_WORKERS", e))?;
        }

        if let Some(retries) = lookup("APISIX_INGRESS_MAX_RETRIES") {
            self.controller.max_retries = retries
                .parse()
                .map_err(|e| invalid("APISIX_INGRESS_MAX_RETRIES", e))?;
        }

        // Observability overrides
        if let Some(level) = lookup("APISIX_INGRESS_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Some(format) = lookup("APISIX_INGRESS_LOG_FORMAT") {
            self.observability.logging.format = format;
        }

        if let Some(enabled) = lookup("APISIX_INGRESS_METRICS_ENABLED") {
            self.observability.metrics.enabled = enabled
                .parse()
                .map_err(|e| invalid("APISIX_INGRESS_METRICS_ENABLED", e))?;
        }

        if let Some(port) = lookup("APISIX_INGRESS_METRICS_PORT") {
            self.observability.metrics.port = port
                .parse()
                .map_err(|e| invalid("APISIX_INGRESS_METRICS_PORT", e))?;
        }

        if let Some(port) = lookup("APISIX_INGRESS_HEALTH_PORT") {
            self.observability.health_port = port
                .parse()
                .map_err(|e| invalid("APISIX_INGRESS_HEALTH_PORT", e))?;
        }

        Ok(())
    }

    /// Comprehensive configuration validation with detailed error messages
    pub fn validate(&self) -> ControllerResult<()> {
        let mut errors = Vec::new();

        // Kubernetes
        if self.kubernetes.ingress_class.is_empty() {
            errors.push("ingress_class cannot be empty".to_string());
        }

        match self.kubernetes.ingress_version.as_str() {
            "networking/v1" | "networking/v1beta1" => {}
            other => errors.push(format!("Unsupported ingress_version: {}", other)),
        }

        match self.kubernetes.apisix_route_version.as_str() {
            "apisix.apache.org/v2" | "apisix.apache.org/v2beta3" => {}
            other => errors.push(format!("Unsupported apisix_route_version: {}", other)),
        }

        match self.kubernetes.apisix_consumer_version.as_str() {
            "apisix.apache.org/v2" | "apisix.apache.org/v2beta3" => {}
            other => errors.push(format!("Unsupported apisix_consumer_version: {}", other)),
        }

        if self.kubernetes.resync_interval.is_zero() {
            errors.push("resync_interval must be greater than 0".to_string());
        }

        for ns in &self.kubernetes.watched_namespaces {
            if ns.is_empty() {
                errors.push("watched_namespaces cannot contain empty entries".to_string());
            }
        }

        // Admin API
        match Url::parse(&self.apisix.admin_base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!("admin_base_url has unsupported scheme: {}", url.scheme())),
            Err(e) => errors.push(format!("Invalid admin_base_url '{}': {}", self.apisix.admin_base_url, e)),
        }

        if self.apisix.timeout.is_zero() {
            errors.push("admin timeout must be greater than 0".to_string());
        }

        // Reconcile
        if self.controller.workers == 0 {
            errors.push("workers must be greater than 0".to_string());
        }

        if self.controller.base_retry_delay.is_zero() {
            errors.push("base_retry_delay must be greater than 0".to_string());
        }

        if self.controller.max_retry_delay < self.controller.base_retry_delay {
            errors.push("max_retry_delay must not be smaller than base_retry_delay".to_string());
        }

        // Observability
        match self.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.observability.logging.level)),
        }

        match self.observability.logging.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => errors.push(format!("Invalid log format: {}", self.observability.logging.format)),
        }

        if self.observability.metrics.enabled
            && self.observability.metrics.port == self.observability.health_port
        {
            errors.push("metrics port and health port must differ".to_string());
        }

        if !errors.is_empty() {
            return Err(ControllerError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

/// Kubernetes configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KubernetesConfig {
    /// Kubeconfig file path (optional, uses in-cluster config if not specified)
    pub kubeconfig_path: Option<String>,

    /// Namespaces to watch; empty means all namespaces
    pub watched_namespaces: Vec<String>,

    /// Ingress class handled by this controller
    pub ingress_class: String,

    /// Ingress API version to watch (`networking/v1` or `networking/v1beta1`)
    pub ingress_version: String,

    /// ApisixRoute API version to watch
    pub apisix_route_version: String,

    /// ApisixConsumer API version to watch
    pub apisix_consumer_version: String,

    /// Interval between full resyncs of every controller
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,

    /// Watch Gateway API resources (Gateway, TCPRoute)
    pub enable_gateway_api: bool,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            kubeconfig_path: None,
            watched_namespaces: Vec::new(),
            ingress_class: "apisix".to_string(),
            ingress_version: "networking/v1".to_string(),
            apisix_route_version: "apisix.apache.org/v2".to_string(),
            apisix_consumer_version: "apisix.apache.org/v2".to_string(),
            resync_interval: Duration::from_secs(6 * 60 * 60),
            enable_gateway_api: false,
        }
    }
}

impl KubernetesConfig {
    /// Whether events from `namespace` should be handled
    pub fn watches_namespace(&self, namespace: &str) -> bool {
        self.watched_namespaces.is_empty()
            || namespace.is_empty()
            || self.watched_namespaces.iter().any(|ns| ns == namespace)
    }
}

/// Gateway admin API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApisixConfig {
    /// Base URL of the admin API, e.g. `http://127.0.0.1:9180/apisix/admin`
    pub admin_base_url: String,

    /// Value of the `X-API-KEY` header
    pub admin_key: String,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApisixConfig {
    fn default() -> Self {
        Self {
            admin_base_url: "http://127.0.0.1:9180/apisix/admin".to_string(),
            admin_key: String::new(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Work queue and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Worker tasks per controller
    pub workers: usize,

    /// First retry delay for a failing key
    #[serde(with = "humantime_serde")]
    pub base_retry_delay: Duration,

    /// Upper bound of the per-key retry delay
    #[serde(with = "humantime_serde")]
    pub max_retry_delay: Duration,

    /// Retries before an event is dropped and left to the next resync
    pub max_retries: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Port of the `/healthz` and `/readyz` server
    pub health_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            health_port: 8081,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose Prometheus metrics
    pub enabled: bool,

    /// Port of the Prometheus exporter
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}
