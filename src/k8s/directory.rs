//! # Service, Secret and Upstream Directories
//!
//! Read-only lookups the translator needs beyond the object it translates.
//! Every trait is implemented over informer stores for the running
//! controller and can be implemented in memory for tests.

use k8s_openapi::api::core::v1::{Endpoints, Secret, Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::{ControllerError, ControllerResult};
use crate::core::types::ObjectKey;
use crate::k8s::crd::{ApisixUpstream, ApisixUpstreamConfig};
use crate::k8s::store::LocalStore;

/// A backend port as written in a route: a number or a port name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendPort {
    Number(i32),
    Name(String),
}

impl From<&IntOrString> for BackendPort {
    fn from(value: &IntOrString) -> Self {
        match value {
            IntOrString::Int(port) => Self::Number(*port),
            IntOrString::String(name) => match name.parse() {
                Ok(port) => Self::Number(port),
                Err(_) => Self::Name(name.clone()),
            },
        }
    }
}

/// A `(host, port)` pair an upstream node is built from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Endpoint {
    pub host: String,
    pub port: i32,
}

/// Service port and endpoint lookups
pub trait ServiceDirectory: Send + Sync {
    /// Resolve a backend port to the service port number
    fn resolve_port(&self, namespace: &str, service: &str, port: &BackendPort) -> ControllerResult<i32>;

    /// Ready endpoints behind a service port, sorted by `(host, port)`
    fn endpoints(&self, namespace: &str, service: &str, port: i32) -> ControllerResult<Vec<Endpoint>>;

    /// The cluster IP endpoint of a service port
    fn cluster_ip(&self, namespace: &str, service: &str, port: i32) -> ControllerResult<Endpoint>;
}

/// Secret field lookups
pub trait SecretDirectory: Send + Sync {
    /// Every field of a secret, decoded as UTF-8
    fn resolve_all(&self, namespace: &str, name: &str) -> ControllerResult<BTreeMap<String, String>>;

    /// One field of a secret
    fn resolve(&self, namespace: &str, name: &str, field: &str) -> ControllerResult<String> {
        self.resolve_all(namespace, name)?
            .remove(field)
            .ok_or_else(|| ControllerError::reference("secret", format!("{}/{} has no field {}", namespace, name, field)))
    }
}

/// Upstream settings kept in ApisixUpstream objects
pub trait UpstreamDirectory: Send + Sync {
    /// Settings for upstreams of `service` and, when given, its port
    ///
    /// Port level settings replace the object wide value field by field.
    fn upstream_config(&self, namespace: &str, service: &str, port: i32) -> Option<ApisixUpstreamConfig>;
}

fn service_not_found() -> ControllerError {
    ControllerError::reference("service", "service not found")
}

fn port_not_found() -> ControllerError {
    ControllerError::reference("service", "port not found")
}

fn find_service_port<'a>(service: &'a Service, port: &BackendPort) -> Option<&'a ServicePort> {
    let ports = service.spec.as_ref()?.ports.as_ref()?;
    ports.iter().find(|sp| match port {
        BackendPort::Number(number) => sp.port == *number,
        BackendPort::Name(name) => sp.name.as_deref() == Some(name.as_str()),
    })
}

/// `ServiceDirectory` over informer stores of Services and Endpoints
#[derive(Debug, Clone)]
pub struct KubeServiceDirectory {
    services: Arc<LocalStore<Service>>,
    endpoints: Arc<LocalStore<Endpoints>>,
}

impl KubeServiceDirectory {
    pub fn new(services: Arc<LocalStore<Service>>, endpoints: Arc<LocalStore<Endpoints>>) -> Self {
        Self { services, endpoints }
    }

    fn service(&self, namespace: &str, name: &str) -> ControllerResult<Arc<Service>> {
        self.services
            .get(&ObjectKey::new(namespace, name))
            .ok_or_else(service_not_found)
    }
}

impl ServiceDirectory for KubeServiceDirectory {
    fn resolve_port(&self, namespace: &str, service: &str, port: &BackendPort) -> ControllerResult<i32> {
        let svc = self.service(namespace, service)?;
        find_service_port(&svc, port).map(|sp| sp.port).ok_or_else(port_not_found)
    }

    fn endpoints(&self, namespace: &str, service: &str, port: i32) -> ControllerResult<Vec<Endpoint>> {
        let svc = self.service(namespace, service)?;
        let service_port = find_service_port(&svc, &BackendPort::Number(port)).ok_or_else(port_not_found)?;

        // Endpoints may not exist yet for a brand new service
        let Some(endpoints) = self.endpoints.get(&ObjectKey::new(namespace, service)) else {
            return Ok(Vec::new());
        };

        let mut nodes = Vec::new();
        for subset in endpoints.subsets.iter().flatten() {
            let ports = subset.ports.as_deref().unwrap_or_default();
            let matched = ports.iter().find(|ep| {
                ep.name == service_port.name || (ports.len() == 1 && service_port.name.is_none())
            });
            let Some(endpoint_port) = matched else {
                continue;
            };
            for address in subset.addresses.iter().flatten() {
                nodes.push(Endpoint {
                    host: address.ip.clone(),
                    port: endpoint_port.port,
                });
            }
        }
        nodes.sort();
        nodes.dedup();
        Ok(nodes)
    }

    fn cluster_ip(&self, namespace: &str, service: &str, port: i32) -> ControllerResult<Endpoint> {
        let svc = self.service(namespace, service)?;
        find_service_port(&svc, &BackendPort::Number(port)).ok_or_else(port_not_found)?;
        let ip = svc
            .spec
            .as_ref()
            .and_then(|spec| spec.cluster_ip.clone())
            .filter(|ip| !ip.is_empty() && ip != "None")
            .ok_or_else(|| ControllerError::reference("service", "service has no cluster ip"))?;
        Ok(Endpoint { host: ip, port })
    }
}

/// `SecretDirectory` over an informer store of Secrets
#[derive(Debug, Clone)]
pub struct KubeSecretDirectory {
    secrets: Arc<LocalStore<Secret>>,
}

impl KubeSecretDirectory {
    pub fn new(secrets: Arc<LocalStore<Secret>>) -> Self {
        Self { secrets }
    }
}

impl SecretDirectory for KubeSecretDirectory {
    fn resolve_all(&self, namespace: &str, name: &str) -> ControllerResult<BTreeMap<String, String>> {
        let secret = self
            .secrets
            .get(&ObjectKey::new(namespace, name))
            .ok_or_else(|| ControllerError::reference("secret", format!("secret {}/{} not found", namespace, name)))?;

        let mut fields = BTreeMap::new();
        for (key, value) in secret.data.iter().flatten() {
            let text = String::from_utf8(value.0.clone()).map_err(|_| {
                ControllerError::reference("secret", format!("{}/{} field {} is not valid UTF-8", namespace, name, key))
            })?;
            fields.insert(key.clone(), text);
        }
        for (key, value) in secret.string_data.iter().flatten() {
            fields.insert(key.clone(), value.clone());
        }
        Ok(fields)
    }
}

/// `UpstreamDirectory` over an informer store of ApisixUpstreams
///
/// Objects asking for another ingress class are invisible.
#[derive(Debug, Clone)]
pub struct KubeUpstreamDirectory {
    upstreams: Arc<LocalStore<ApisixUpstream>>,
    ingress_class: String,
}

impl KubeUpstreamDirectory {
    pub fn new(upstreams: Arc<LocalStore<ApisixUpstream>>, ingress_class: impl Into<String>) -> Self {
        Self {
            upstreams,
            ingress_class: ingress_class.into(),
        }
    }

    fn owns(&self, upstream: &ApisixUpstream) -> bool {
        upstream
            .spec
            .ingress_class_name
            .as_deref()
            .map_or(true, |class| class == self.ingress_class)
    }

    /// Services whose ApisixUpstream reads the TLS secret `secret`
    pub fn services_using_secret(&self, secret: &ObjectKey) -> Vec<ObjectKey> {
        self.upstreams
            .list()
            .into_iter()
            .filter(|upstream| self.owns(upstream))
            .filter(|upstream| {
                let spec = &upstream.spec;
                std::iter::once(&spec.config)
                    .chain(spec.port_level_settings.iter().map(|p| &p.config))
                    .filter_map(|config| config.tls_secret.as_ref())
                    .any(|tls| tls.namespace == secret.namespace && tls.name == secret.name)
            })
            .map(|upstream| {
                ObjectKey::new(
                    upstream.metadata.namespace.clone().unwrap_or_default(),
                    upstream.metadata.name.clone().unwrap_or_default(),
                )
            })
            .collect()
    }
}

impl UpstreamDirectory for KubeUpstreamDirectory {
    fn upstream_config(&self, namespace: &str, service: &str, port: i32) -> Option<ApisixUpstreamConfig> {
        let upstream = self.upstreams.get(&ObjectKey::new(namespace, service))?;
        if !self.owns(&upstream) {
            return None;
        }
        let mut config = upstream.spec.config.clone();
        if let Some(level) = upstream.spec.port_level_settings.iter().find(|p| p.port == port) {
            config.overlay(&level.config);
        }
        Some(config)
    }
}

impl ApisixUpstreamConfig {
    /// Replace every field `other` sets
    pub fn overlay(&mut self, other: &ApisixUpstreamConfig) {
        macro_rules! take {
            ($($field:ident),*) => {$(
                if other.$field.is_some() {
                    self.$field = other.$field.clone();
                }
            )*};
        }
        take!(scheme, loadbalancer, health_check, retries, timeout, tls_secret);
    }
}
