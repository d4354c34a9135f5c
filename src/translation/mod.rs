//! # Translation
//!
//! Pure conversion of source objects into gateway [`Manifest`]s.
//!
//! A [`Translator`] owns read-only handles to the service directory, the
//! secret directory, the Gateway listener table and optionally the
//! ApisixUpstream settings. It never talks to the
//! gateway, so translating the same object twice with unchanged directories
//! yields structurally equal manifests with byte-identical JSON.
//!
//! Versioned sources are tagged enums; each version has its own translate
//! function and every version converges on the same canonical manifest.

pub mod annotations;
pub mod apisix_route;
pub mod consumer;
pub mod gateway;
pub mod ingress;
pub mod plugin_config;
pub mod tls;
pub mod upstream;

use serde_json::Value;
use std::sync::Arc;

use crate::apisix::types::Plugins;
use crate::core::error::{ControllerError, ControllerResult};
use crate::k8s::crd::ApisixRoutePlugin;
use crate::k8s::directory::{SecretDirectory, ServiceDirectory, UpstreamDirectory};

pub use gateway::{Listener, ListenerTable};

/// Converts source objects to manifests
#[derive(Clone)]
pub struct Translator {
    services: Arc<dyn ServiceDirectory>,
    secrets: Arc<dyn SecretDirectory>,
    listeners: Arc<ListenerTable>,
    upstream_configs: Option<Arc<dyn UpstreamDirectory>>,
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("listeners", &self.listeners.len())
            .field("upstream_configs", &self.upstream_configs.is_some())
            .finish()
    }
}

impl Translator {
    pub fn new(
        services: Arc<dyn ServiceDirectory>,
        secrets: Arc<dyn SecretDirectory>,
        listeners: Arc<ListenerTable>,
    ) -> Self {
        Self {
            services,
            secrets,
            listeners,
            upstream_configs: None,
        }
    }

    /// Apply ApisixUpstream settings to every translated upstream
    pub fn with_upstream_configs(mut self, upstream_configs: Arc<dyn UpstreamDirectory>) -> Self {
        self.upstream_configs = Some(upstream_configs);
        self
    }

    pub fn services(&self) -> &dyn ServiceDirectory {
        self.services.as_ref()
    }

    pub fn secrets(&self) -> &dyn SecretDirectory {
        self.secrets.as_ref()
    }

    pub fn listeners(&self) -> &Arc<ListenerTable> {
        &self.listeners
    }

    pub fn upstream_configs(&self) -> Option<&dyn UpstreamDirectory> {
        self.upstream_configs.as_deref()
    }

    /// Build a plugin map from plugin entries of a CRD
    ///
    /// Disabled entries are skipped. A `secretRef` merges every field of the
    /// referenced secret over the inline config.
    pub(crate) fn translate_plugins(&self, namespace: &str, entries: &[ApisixRoutePlugin]) -> ControllerResult<Plugins> {
        let mut plugins = Plugins::new();
        for entry in entries.iter().filter(|p| p.enable) {
            if entry.name.is_empty() {
                return Err(ControllerError::malformed("plugin name must not be empty"));
            }
            let mut config = entry.config.clone().unwrap_or_default();
            if let Some(secret) = entry.secret_ref.as_deref() {
                for (field, value) in self.secrets.resolve_all(namespace, secret)? {
                    config.insert(field, Value::String(value));
                }
            }
            plugins.insert(entry.name.clone(), Value::Object(config));
        }
        Ok(plugins)
    }
}
