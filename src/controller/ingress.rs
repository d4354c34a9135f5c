//! Ingress reconciliation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::controller::{matches_class, Dependency, Reconciler};
use crate::core::error::ControllerResult;
use crate::core::types::ObjectKey;
use crate::k8s::objects::{IngressObject, SourceObject};
use crate::k8s::store::LocalStore;
use crate::manifest::Manifest;
use crate::translation::Translator;

pub struct IngressReconciler {
    store: Arc<LocalStore<IngressObject>>,
    translator: Translator,
    ingress_class: String,
}

impl IngressReconciler {
    pub fn new(store: Arc<LocalStore<IngressObject>>, translator: Translator, ingress_class: impl Into<String>) -> Self {
        Self {
            store,
            translator,
            ingress_class: ingress_class.into(),
        }
    }
}

#[async_trait]
impl Reconciler for IngressReconciler {
    type Object = IngressObject;
    const KIND: &'static str = "Ingress";

    fn store(&self) -> &Arc<LocalStore<IngressObject>> {
        &self.store
    }

    fn translate(&self, object: &IngressObject) -> ControllerResult<Manifest> {
        if !matches_class(object.ingress_class().as_deref(), &self.ingress_class) {
            debug!(key = %object.key(), "Ingress belongs to another ingress class");
            return Ok(Manifest::new());
        }
        self.translator.translate_ingress(object)
    }

    fn dependencies(&self, object: &IngressObject) -> Vec<Dependency> {
        let namespace = object.key().namespace;
        let key = |name: &str| ObjectKey::new(namespace.as_str(), name);

        match object {
            IngressObject::V1(ing) => {
                let Some(spec) = &ing.spec else {
                    return Vec::new();
                };
                let services = spec
                    .rules
                    .iter()
                    .flatten()
                    .filter_map(|rule| rule.http.as_ref())
                    .flat_map(|http| http.paths.iter())
                    .filter_map(|path| path.backend.service.as_ref())
                    .map(|service| Dependency::Service(key(&service.name)));
                let secrets = spec
                    .tls
                    .iter()
                    .flatten()
                    .filter_map(|tls| tls.secret_name.as_deref())
                    .map(|name| Dependency::Secret(key(name)));
                services.chain(secrets).collect()
            }
            IngressObject::V1beta1(ing) => {
                let services = ing
                    .spec
                    .rules
                    .iter()
                    .filter_map(|rule| rule.http.as_ref())
                    .flat_map(|http| http.paths.iter())
                    .map(|path| Dependency::Service(key(&path.backend.service_name)));
                let secrets = ing
                    .spec
                    .tls
                    .iter()
                    .filter_map(|tls| tls.secret_name.as_deref())
                    .map(|name| Dependency::Secret(key(name)));
                services.chain(secrets).collect()
            }
        }
    }
}
