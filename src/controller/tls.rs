//! ApisixTls reconciliation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::controller::{apisix_status_target, matches_class, Dependency, Reconciler};
use crate::core::error::ControllerResult;
use crate::core::types::ObjectKey;
use crate::k8s::crd::ApisixTls;
use crate::k8s::objects::SourceObject;
use crate::k8s::status::StatusTarget;
use crate::k8s::store::LocalStore;
use crate::manifest::Manifest;
use crate::translation::Translator;

pub struct TlsReconciler {
    store: Arc<LocalStore<ApisixTls>>,
    translator: Translator,
    ingress_class: String,
}

impl TlsReconciler {
    pub fn new(store: Arc<LocalStore<ApisixTls>>, translator: Translator, ingress_class: impl Into<String>) -> Self {
        Self {
            store,
            translator,
            ingress_class: ingress_class.into(),
        }
    }

    fn owns(&self, tls: &ApisixTls) -> bool {
        matches_class(tls.spec.ingress_class_name.as_deref(), &self.ingress_class)
    }
}

#[async_trait]
impl Reconciler for TlsReconciler {
    type Object = ApisixTls;
    const KIND: &'static str = "ApisixTls";

    fn store(&self) -> &Arc<LocalStore<ApisixTls>> {
        &self.store
    }

    fn translate(&self, object: &ApisixTls) -> ControllerResult<Manifest> {
        let mut manifest = Manifest::new();
        if !self.owns(object) {
            debug!(key = %object.key(), "ApisixTls belongs to another ingress class");
            return Ok(manifest);
        }
        manifest.ssls.push(self.translator.translate_tls(object)?);
        Ok(manifest)
    }

    fn status_target(&self, object: &ApisixTls) -> Option<StatusTarget> {
        self.owns(object)
            .then(|| apisix_status_target(object, object.status.as_ref()))
    }

    /// The certificate secret and the client CA secret, which may live in
    /// other namespaces
    fn dependencies(&self, object: &ApisixTls) -> Vec<Dependency> {
        let secret = &object.spec.secret;
        let mut deps = vec![Dependency::Secret(ObjectKey::new(
            secret.namespace.as_str(),
            secret.name.as_str(),
        ))];
        if let Some(client) = &object.spec.client {
            deps.push(Dependency::Secret(ObjectKey::new(
                client.ca_secret.namespace.as_str(),
                client.ca_secret.name.as_str(),
            )));
        }
        deps
    }
}
