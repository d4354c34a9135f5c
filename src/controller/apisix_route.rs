//! ApisixRoute reconciliation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::controller::{apisix_status_target, matches_class, plugin_secret_dependencies, Dependency, Reconciler};
use crate::core::error::ControllerResult;
use crate::core::types::ObjectKey;
use crate::k8s::crd::{ApisixRouteBackend, ApisixRouteHttp, ApisixRouteStream};
use crate::k8s::objects::{ApisixRouteObject, SourceObject};
use crate::k8s::status::StatusTarget;
use crate::k8s::store::LocalStore;
use crate::manifest::Manifest;
use crate::translation::Translator;

pub struct ApisixRouteReconciler {
    store: Arc<LocalStore<ApisixRouteObject>>,
    translator: Translator,
    ingress_class: String,
}

impl ApisixRouteReconciler {
    pub fn new(store: Arc<LocalStore<ApisixRouteObject>>, translator: Translator, ingress_class: impl Into<String>) -> Self {
        Self {
            store,
            translator,
            ingress_class: ingress_class.into(),
        }
    }

    /// Only v2 objects carry an ingress class
    fn owns(&self, object: &ApisixRouteObject) -> bool {
        match object {
            ApisixRouteObject::V2(route) => {
                matches_class(route.spec.ingress_class_name.as_deref(), &self.ingress_class)
            }
            ApisixRouteObject::V2beta3(_) => true,
        }
    }
}

#[async_trait]
impl Reconciler for ApisixRouteReconciler {
    type Object = ApisixRouteObject;
    const KIND: &'static str = "ApisixRoute";

    fn store(&self) -> &Arc<LocalStore<ApisixRouteObject>> {
        &self.store
    }

    fn translate(&self, object: &ApisixRouteObject) -> ControllerResult<Manifest> {
        if !self.owns(object) {
            debug!(key = %object.key(), "ApisixRoute belongs to another ingress class");
            return Ok(Manifest::new());
        }
        self.translator.translate_apisix_route(object)
    }

    fn status_target(&self, object: &ApisixRouteObject) -> Option<StatusTarget> {
        if !self.owns(object) {
            return None;
        }
        Some(match object {
            ApisixRouteObject::V2(route) => apisix_status_target(route, route.status.as_ref()),
            ApisixRouteObject::V2beta3(route) => apisix_status_target(route, route.status.as_ref()),
        })
    }

    fn dependencies(&self, object: &ApisixRouteObject) -> Vec<Dependency> {
        let namespace = object.key().namespace;
        let (rules, backends, streams): (Vec<&ApisixRouteHttp>, Vec<&ApisixRouteBackend>, &[ApisixRouteStream]) =
            match object {
                ApisixRouteObject::V2(route) => (route.spec.http.iter().collect(), Vec::new(), &route.spec.stream),
                ApisixRouteObject::V2beta3(route) => (
                    route.spec.http.iter().map(|h| &h.rule).collect(),
                    route.spec.http.iter().filter_map(|h| h.backend.as_ref()).collect(),
                    &route.spec.stream,
                ),
            };

        let service = |backend: &ApisixRouteBackend| {
            Dependency::Service(ObjectKey::new(namespace.as_str(), backend.service_name.as_str()))
        };
        let mut deps: Vec<Dependency> = rules
            .iter()
            .flat_map(|rule| rule.backends.iter())
            .chain(backends)
            .chain(streams.iter().map(|s| &s.backend))
            .map(service)
            .collect();
        for rule in rules {
            deps.extend(plugin_secret_dependencies(&namespace, &rule.plugins));
        }
        deps
    }
}
