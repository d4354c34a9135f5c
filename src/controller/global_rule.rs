//! ApisixGlobalRule reconciliation.

use async_trait::async_trait;
use std::sync::Arc;

use crate::controller::{apisix_status_target, plugin_secret_dependencies, Dependency, Reconciler};
use crate::core::error::ControllerResult;
use crate::k8s::crd::ApisixGlobalRule;
use crate::k8s::objects::SourceObject;
use crate::k8s::status::StatusTarget;
use crate::k8s::store::LocalStore;
use crate::manifest::Manifest;
use crate::translation::Translator;

pub struct GlobalRuleReconciler {
    store: Arc<LocalStore<ApisixGlobalRule>>,
    translator: Translator,
}

impl GlobalRuleReconciler {
    pub fn new(store: Arc<LocalStore<ApisixGlobalRule>>, translator: Translator) -> Self {
        Self { store, translator }
    }
}

#[async_trait]
impl Reconciler for GlobalRuleReconciler {
    type Object = ApisixGlobalRule;
    const KIND: &'static str = "ApisixGlobalRule";

    fn store(&self) -> &Arc<LocalStore<ApisixGlobalRule>> {
        &self.store
    }

    fn translate(&self, object: &ApisixGlobalRule) -> ControllerResult<Manifest> {
        let mut manifest = Manifest::new();
        manifest
            .global_rules
            .push(self.translator.translate_global_rule(object)?);
        Ok(manifest)
    }

    fn status_target(&self, object: &ApisixGlobalRule) -> Option<StatusTarget> {
        Some(apisix_status_target(object, object.status.as_ref()))
    }

    fn dependencies(&self, object: &ApisixGlobalRule) -> Vec<Dependency> {
        plugin_secret_dependencies(&object.key().namespace, &object.spec.plugins)
    }
}
