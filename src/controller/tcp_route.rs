//! TCPRoute reconciliation.
//!
//! A TCPRoute whose parent listener is gone (the Gateway was deleted or lost
//! the listener) translates to an empty manifest, which removes the stream
//! routes synced for it. The route binds again on the resync that follows
//! the next listener change.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::controller::{Dependency, Reconciler};
use crate::core::error::{ControllerError, ControllerResult};
use crate::core::types::ObjectKey;
use crate::k8s::crd::TCPRoute;
use crate::k8s::objects::SourceObject;
use crate::k8s::store::LocalStore;
use crate::manifest::Manifest;
use crate::translation::gateway::PARENT_REFS_FIELD;
use crate::translation::Translator;

pub struct TcpRouteReconciler {
    store: Arc<LocalStore<TCPRoute>>,
    translator: Translator,
}

impl TcpRouteReconciler {
    pub fn new(store: Arc<LocalStore<TCPRoute>>, translator: Translator) -> Self {
        Self { store, translator }
    }
}

#[async_trait]
impl Reconciler for TcpRouteReconciler {
    type Object = TCPRoute;
    const KIND: &'static str = "TCPRoute";

    fn store(&self) -> &Arc<LocalStore<TCPRoute>> {
        &self.store
    }

    fn translate(&self, object: &TCPRoute) -> ControllerResult<Manifest> {
        match self.translator.translate_tcp_route(object) {
            Err(ControllerError::Reference { field, reason }) if field == PARENT_REFS_FIELD => {
                warn!(key = %object.key(), reason = %reason, "TCPRoute has no listener, detaching it");
                Ok(Manifest::new())
            }
            result => result,
        }
    }

    fn dependencies(&self, object: &TCPRoute) -> Vec<Dependency> {
        let namespace = object.key().namespace;
        object
            .spec
            .rules
            .iter()
            .flat_map(|rule| rule.backend_refs.iter())
            .map(|backend| {
                let ns = backend.namespace.as_deref().unwrap_or(&namespace);
                Dependency::Service(ObjectKey::new(ns, backend.name.as_str()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::crd::{BackendRef, ParentReference, TCPRouteRule, TCPRouteSpec};
    use crate::translation::testing::translator;

    #[test]
    fn test_backend_services_are_dependencies() {
        let mut route = TCPRoute::new(
            "redis",
            TCPRouteSpec {
                parent_refs: vec![ParentReference {
                    name: "gw".to_string(),
                    ..Default::default()
                }],
                rules: vec![TCPRouteRule {
                    backend_refs: vec![
                        BackendRef {
                            name: "redis".to_string(),
                            port: Some(6379),
                            ..Default::default()
                        },
                        BackendRef {
                            name: "redis-replica".to_string(),
                            namespace: Some("cache".to_string()),
                            port: Some(6379),
                            ..Default::default()
                        },
                    ],
                }],
            },
        );
        route.metadata.namespace = Some("default".to_string());

        let r = TcpRouteReconciler::new(Arc::new(LocalStore::new()), translator());
        assert_eq!(
            r.dependencies(&route),
            vec![
                Dependency::Service(ObjectKey::new("default", "redis")),
                Dependency::Service(ObjectKey::new("cache", "redis-replica")),
            ]
        );
        // no gateway listener known yet
        assert!(r.translate(&route).unwrap().is_empty());
    }
}
