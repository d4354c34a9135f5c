//! Gateway API translation.
//!
//! A Gateway does not produce admin API entities. Its listeners are kept in a
//! [`ListenerTable`] that TCPRoute translation reads to find the port a
//! stream route binds to.

use dashmap::DashMap;
use std::collections::HashSet;

use crate::apisix::types::{managed_labels, StreamRoute};
use crate::core::error::{ControllerError, ControllerResult};
use crate::core::types::ObjectKey;
use crate::identity::{compose_tcp_route_name, gen_id};
use crate::k8s::crd::{Gateway, ParentReference, TCPRoute};
use crate::k8s::directory::BackendPort;
use crate::k8s::objects::SourceObject;
use crate::manifest::Manifest;
use crate::translation::Translator;

const SUPPORTED_PROTOCOLS: [&str; 5] = ["HTTP", "HTTPS", "TLS", "TCP", "UDP"];

/// A listener of a Gateway
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub gateway: ObjectKey,
    pub name: String,
    pub hostname: Option<String>,
    pub port: i32,
    pub protocol: String,
}

/// Listeners of every known Gateway
#[derive(Debug, Default)]
pub struct ListenerTable {
    gateways: DashMap<ObjectKey, Vec<Listener>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of gateways with listeners
    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    /// Replace the listeners of a gateway, returning whether they changed
    pub fn set(&self, gateway: ObjectKey, listeners: Vec<Listener>) -> bool {
        match self.gateways.insert(gateway, listeners.clone()) {
            Some(previous) => previous != listeners,
            None => true,
        }
    }

    /// Forget a gateway, returning whether it was known
    pub fn remove(&self, gateway: &ObjectKey) -> bool {
        self.gateways.remove(gateway).is_some()
    }

    pub fn listeners(&self, gateway: &ObjectKey) -> Vec<Listener> {
        self.gateways
            .get(gateway)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Listener a parent reference of a route in `namespace` points at
    ///
    /// `sectionName` selects by listener name, `port` by port; with neither
    /// the first listener speaking `protocol` is used.
    pub fn find(&self, namespace: &str, parent: &ParentReference, protocol: &str) -> Option<Listener> {
        let gateway = ObjectKey::new(parent.namespace.as_deref().unwrap_or(namespace), parent.name.as_str());
        let listeners = self.gateways.get(&gateway)?;
        listeners
            .iter()
            .filter(|l| l.protocol == protocol)
            .find(|l| {
                parent.section_name.as_deref().map_or(true, |s| s == l.name)
                    && parent.port.map_or(true, |p| p == l.port)
            })
            .cloned()
    }
}

/// Field of the reference error raised when a TCPRoute has no listener
pub const PARENT_REFS_FIELD: &str = "parentRefs";

impl Translator {
    /// Listeners declared by a Gateway
    pub fn translate_gateway(&self, gateway: &Gateway) -> ControllerResult<Vec<Listener>> {
        let key = gateway.key();
        let mut names = HashSet::new();
        let mut listeners = Vec::with_capacity(gateway.spec.listeners.len());

        for listener in &gateway.spec.listeners {
            if !names.insert(listener.name.as_str()) {
                return Err(ControllerError::malformed(format!("duplicated listener name {}", listener.name)));
            }
            if !(1..=65535).contains(&listener.port) {
                return Err(ControllerError::malformed(format!(
                    "listener {} has invalid port {}",
                    listener.name, listener.port
                )));
            }
            if !SUPPORTED_PROTOCOLS.contains(&listener.protocol.as_str()) {
                return Err(ControllerError::malformed(format!(
                    "listener {} has unsupported protocol {}",
                    listener.name, listener.protocol
                )));
            }
            listeners.push(Listener {
                gateway: key.clone(),
                name: listener.name.clone(),
                hostname: listener.hostname.clone(),
                port: listener.port,
                protocol: listener.protocol.clone(),
            });
        }
        Ok(listeners)
    }

    /// One stream route and upstream per backend of every rule
    ///
    /// The route binds to the TCP listener of its first parent reference.
    /// Backends with weight 0 receive no traffic and are skipped.
    pub fn translate_tcp_route(&self, route: &TCPRoute) -> ControllerResult<Manifest> {
        let key = route.key();
        let parent = route
            .spec
            .parent_refs
            .first()
            .ok_or_else(|| ControllerError::malformed("tcproute has no parentRefs"))?;
        let listener = self
            .listeners()
            .find(&key.namespace, parent, "TCP")
            .ok_or_else(|| ControllerError::reference(PARENT_REFS_FIELD, "listener not found"))?;

        let mut manifest = Manifest::new();
        for (rule_index, rule) in route.spec.rules.iter().enumerate() {
            for (backend_index, backend) in rule.backend_refs.iter().enumerate() {
                if backend.weight == Some(0) {
                    continue;
                }
                let port = backend
                    .port
                    .ok_or_else(|| ControllerError::malformed(format!("backendRef {} has no port", backend.name)))?;
                let namespace = backend.namespace.as_deref().unwrap_or(&key.namespace);
                let upstream = self.translate_upstream(namespace, &backend.name, &BackendPort::Number(port), None)?;

                let full_name = compose_tcp_route_name(&key.namespace, &key.name, rule_index, backend_index);
                manifest.stream_routes.push(StreamRoute {
                    id: gen_id(&full_name),
                    desc: Some(full_name),
                    labels: managed_labels(),
                    server_port: Some(listener.port),
                    sni: None,
                    upstream_id: upstream.id.clone(),
                });
                manifest.add_upstream(upstream);
            }
        }
        Ok(manifest)
    }
}
