//! # Gateway Cluster Client
//!
//! `ApisixClient` talks to the admin API of one gateway cluster and owns the
//! write-through cache of everything that cluster holds.
//!
//! ## Readiness
//! Reads (`get`/`list`) are served from the cache only, so they wait until
//! `sync_cache()` has loaded every kind once. Writes never wait; before the
//! first sync the idempotent-create shortcut simply never hits.

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::apisix::cache::{Cached, GatewayCache, KeyedLocks};
use crate::apisix::resource::ResourceClient;
use crate::apisix::types::{
    Consumer, GlobalRule, PluginConfig, ResourceKind, Route, Ssl, StreamRoute, Upstream,
};
use crate::core::config::ApisixConfig;
use crate::core::error::{ControllerError, ControllerResult};
use crate::observability::metrics::{ControllerMetrics, SyncResult};

const ADMIN_KEY_HEADER: &str = "X-API-KEY";
const CACHE_SYNC_ATTEMPTS: u32 = 5;
const CACHE_SYNC_BACKOFF: Duration = Duration::from_secs(2);

/// Client of one gateway cluster
pub struct ApisixClient {
    http: reqwest::Client,
    base_url: String,
    admin_key: String,
    cache: GatewayCache,
    locks: KeyedLocks,
    ready: watch::Sender<bool>,
    metrics: ControllerMetrics,
}

impl std::fmt::Debug for ApisixClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApisixClient")
            .field("base_url", &self.base_url)
            .field("ready", &*self.ready.borrow())
            .finish()
    }
}

impl ApisixClient {
    pub fn new(config: &ApisixConfig) -> ControllerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ControllerError::config(format!("Failed to build http client: {}", e)))?;

        let (ready, _) = watch::channel(false);

        Ok(Self {
            http,
            base_url: config.admin_base_url.trim_end_matches('/').to_string(),
            admin_key: config.admin_key.clone(),
            cache: GatewayCache::new(),
            locks: KeyedLocks::new(),
            ready,
            metrics: ControllerMetrics::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Typed client of one entity kind
    pub fn resource<T: Cached>(&self) -> ResourceClient<'_, T> {
        ResourceClient::new(self)
    }

    pub fn route(&self) -> ResourceClient<'_, Route> {
        self.resource()
    }

    pub fn upstream(&self) -> ResourceClient<'_, Upstream> {
        self.resource()
    }

    pub fn consumer(&self) -> ResourceClient<'_, Consumer> {
        self.resource()
    }

    pub fn plugin_config(&self) -> ResourceClient<'_, PluginConfig> {
        self.resource()
    }

    pub fn global_rule(&self) -> ResourceClient<'_, GlobalRule> {
        self.resource()
    }

    pub fn stream_route(&self) -> ResourceClient<'_, StreamRoute> {
        self.resource()
    }

    pub fn ssl(&self) -> ResourceClient<'_, Ssl> {
        self.resource()
    }

    pub fn cache(&self) -> &GatewayCache {
        &self.cache
    }

    pub(crate) fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Whether the initial cache sync completed
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the initial cache sync completed
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Load every kind from the admin API into the cache and open the gate
    ///
    /// Retried a few times with a fixed backoff; the gateway often starts
    /// after the controller.
    pub async fn sync_cache(&self) -> ControllerResult<()> {
        let mut attempt = 1;
        loop {
            match self.sync_cache_once().await {
                Ok(()) => break,
                Err(err) if attempt < CACHE_SYNC_ATTEMPTS && err.is_retryable() => {
                    warn!(attempt = attempt, error = %err, "Failed to sync gateway cache, retrying");
                    tokio::time::sleep(CACHE_SYNC_BACKOFF).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }

        self.ready.send_replace(true);
        info!(
            routes = self.cache.count(ResourceKind::Route),
            upstreams = self.cache.count(ResourceKind::Upstream),
            consumers = self.cache.count(ResourceKind::Consumer),
            "Gateway cache synced"
        );
        Ok(())
    }

    async fn sync_cache_once(&self) -> ControllerResult<()> {
        tokio::try_join!(
            self.sync_kind::<Upstream>(),
            self.sync_kind::<Consumer>(),
            self.sync_kind::<PluginConfig>(),
            self.sync_kind::<Ssl>(),
            self.sync_kind::<GlobalRule>(),
            self.sync_kind::<Route>(),
            self.sync_kind::<StreamRoute>(),
        )?;
        Ok(())
    }

    async fn sync_kind<T: Cached>(&self) -> ControllerResult<()> {
        let kind = T::KIND.as_str();
        match self.resource::<T>().fetch_all().await {
            Ok(items) => {
                debug!(resource = kind, count = items.len(), "Loaded entities into cache");
                self.cache.replace_all(items);
                self.metrics.record_cache_sync(kind, SyncResult::Success);
                Ok(())
            }
            Err(err) => {
                self.metrics.record_cache_sync(kind, SyncResult::Failure);
                Err(err)
            }
        }
    }

    /// Send one admin API request
    ///
    /// Only transport failures are errors here; callers decide what each
    /// status code means. The body is `Value::Null` when empty or not JSON.
    pub(crate) async fn send(
        &self,
        kind: ResourceKind,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> ControllerResult<(StatusCode, Value)> {
        let started = Instant::now();
        let mut request = self.http.request(method.clone(), url);
        if !self.admin_key.is_empty() {
            request = request.header(ADMIN_KEY_HEADER, &self.admin_key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                self.metrics
                    .record_apisix_request(kind.as_str(), method.as_str(), None, started.elapsed());
                return Err(err.into());
            }
        };

        let status = response.status();
        let text = response.text().await?;
        self.metrics.record_apisix_request(
            kind.as_str(),
            method.as_str(),
            Some(status.as_u16()),
            started.elapsed(),
        );

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        debug!(method = %method, url = url, status = status.as_u16(), "Admin API request");
        Ok((status, value))
    }
}

/// Turn a non-success admin API answer into a retryable error
pub(crate) fn status_error(status: StatusCode, body: &Value) -> ControllerError {
    let message = body
        .get("error_msg")
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| body.to_string());
    ControllerError::remote(Some(status.as_u16()), message)
}
