//! ApisixPluginConfig and ApisixGlobalRule translation.

use crate::apisix::types::{managed_labels, GlobalRule, PluginConfig};
use crate::core::error::ControllerResult;
use crate::identity::{compose_global_rule_name, compose_plugin_config_name, gen_id};
use crate::k8s::crd::{ApisixGlobalRule, ApisixPluginConfig};
use crate::k8s::objects::SourceObject;
use crate::translation::Translator;

impl Translator {
    /// Routes reference the result through `plugin_config_id`, which is
    /// derived from the same name
    pub fn translate_plugin_config(&self, config: &ApisixPluginConfig) -> ControllerResult<PluginConfig> {
        let key = config.key();
        let name = compose_plugin_config_name(&key.namespace, &key.name);
        Ok(PluginConfig {
            id: gen_id(&name),
            name,
            labels: managed_labels(),
            plugins: self.translate_plugins(&key.namespace, &config.spec.plugins)?,
        })
    }

    pub fn translate_global_rule(&self, rule: &ApisixGlobalRule) -> ControllerResult<GlobalRule> {
        let key = rule.key();
        Ok(GlobalRule {
            id: gen_id(&compose_global_rule_name(&key.namespace, &key.name)),
            plugins: self.translate_plugins(&key.namespace, &rule.spec.plugins)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::crd::{ApisixGlobalRuleSpec, ApisixPluginConfigSpec, ApisixRoutePlugin};
    use crate::translation::testing::translator;
    use serde_json::json;

    fn plugins() -> Vec<ApisixRoutePlugin> {
        vec![
            ApisixRoutePlugin {
                name: "prometheus".to_string(),
                enable: true,
                config: None,
                secret_ref: None,
            },
            ApisixRoutePlugin {
                name: "echo".to_string(),
                enable: false,
                config: None,
                secret_ref: None,
            },
        ]
    }

    #[test]
    fn test_plugin_config_id_matches_route_reference() {
        let mut pc = ApisixPluginConfig::new("echo", ApisixPluginConfigSpec { plugins: plugins() });
        pc.metadata.namespace = Some("default".to_string());

        let translated = translator().translate_plugin_config(&pc).unwrap();
        assert_eq!(translated.name, "default_echo");
        assert_eq!(translated.id, gen_id("default_echo"));
        assert_eq!(translated.plugins.len(), 1);
        assert_eq!(translated.plugins["prometheus"], json!({}));
    }

    #[test]
    fn test_global_rule() {
        let mut rule = ApisixGlobalRule::new("metrics", ApisixGlobalRuleSpec { plugins: plugins() });
        rule.metadata.namespace = Some("apisix".to_string());

        let translated = translator().translate_global_rule(&rule).unwrap();
        assert_eq!(translated.id, gen_id("apisix_metrics"));
        assert!(translated.plugins.contains_key("prometheus"));
        assert!(!translated.plugins.contains_key("echo"));
    }
}
