//! ApisixPluginConfig reconciliation.

use async_trait::async_trait;
use std::sync::Arc;

use crate::controller::{apisix_status_target, plugin_secret_dependencies, Dependency, Reconciler};
use crate::core::error::ControllerResult;
use crate::k8s::crd::ApisixPluginConfig;
use crate::k8s::objects::SourceObject;
use crate::k8s::status::StatusTarget;
use crate::k8s::store::LocalStore;
use crate::manifest::Manifest;
use crate::translation::Translator;

pub struct PluginConfigReconciler {
    store: Arc<LocalStore<ApisixPluginConfig>>,
    translator: Translator,
}

impl PluginConfigReconciler {
    pub fn new(store: Arc<LocalStore<ApisixPluginConfig>>, translator: Translator) -> Self {
        Self { store, translator }
    }
}

#[async_trait]
impl Reconciler for PluginConfigReconciler {
    type Object = ApisixPluginConfig;
    const KIND: &'static str = "ApisixPluginConfig";

    fn store(&self) -> &Arc<LocalStore<ApisixPluginConfig>> {
        &self.store
    }

    fn translate(&self, object: &ApisixPluginConfig) -> ControllerResult<Manifest> {
        let mut manifest = Manifest::new();
        manifest
            .plugin_configs
            .push(self.translator.translate_plugin_config(object)?);
        Ok(manifest)
    }

    fn status_target(&self, object: &ApisixPluginConfig) -> Option<StatusTarget> {
        Some(apisix_status_target(object, object.status.as_ref()))
    }

    fn dependencies(&self, object: &ApisixPluginConfig) -> Vec<Dependency> {
        plugin_secret_dependencies(&object.key().namespace, &object.spec.plugins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ObjectKey;
    use crate::identity::{compose_plugin_config_name, gen_id};
    use crate::k8s::crd::{ApisixPluginConfigSpec, ApisixRoutePlugin};
    use crate::translation::testing::translator;

    #[test]
    fn test_plugin_config_manifest() {
        let mut config = ApisixPluginConfig::new(
            "echo",
            ApisixPluginConfigSpec {
                plugins: vec![ApisixRoutePlugin {
                    name: "cors".to_string(),
                    enable: true,
                    config: None,
                    secret_ref: Some("cors-conf".to_string()),
                }],
            },
        );
        config.metadata.namespace = Some("default".to_string());

        let r = PluginConfigReconciler::new(Arc::new(LocalStore::new()), translator());
        assert_eq!(
            r.dependencies(&config),
            vec![Dependency::Secret(ObjectKey::new("default", "cors-conf"))]
        );

        config.spec.plugins[0].secret_ref = None;
        let manifest = r.translate(&config).unwrap();
        assert_eq!(manifest.plugin_configs[0].id, gen_id(&compose_plugin_config_name("default", "echo")));
        assert_eq!(r.status_target(&config).unwrap().plural, "apisixpluginconfigs");
    }
}
