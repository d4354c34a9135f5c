//! ApisixConsumer reconciliation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::controller::{apisix_status_target, matches_class, Dependency, Reconciler};
use crate::core::error::ControllerResult;
use crate::core::types::ObjectKey;
use crate::k8s::objects::{ApisixConsumerObject, SourceObject};
use crate::k8s::status::StatusTarget;
use crate::k8s::store::LocalStore;
use crate::manifest::Manifest;
use crate::translation::Translator;

pub struct ConsumerReconciler {
    store: Arc<LocalStore<ApisixConsumerObject>>,
    translator: Translator,
    ingress_class: String,
}

impl ConsumerReconciler {
    pub fn new(
        store: Arc<LocalStore<ApisixConsumerObject>>,
        translator: Translator,
        ingress_class: impl Into<String>,
    ) -> Self {
        Self {
            store,
            translator,
            ingress_class: ingress_class.into(),
        }
    }

    fn owns(&self, consumer: &ApisixConsumerObject) -> bool {
        matches_class(consumer.ingress_class(), &self.ingress_class)
    }
}

#[async_trait]
impl Reconciler for ConsumerReconciler {
    type Object = ApisixConsumerObject;
    const KIND: &'static str = "ApisixConsumer";

    fn store(&self) -> &Arc<LocalStore<ApisixConsumerObject>> {
        &self.store
    }

    fn translate(&self, object: &ApisixConsumerObject) -> ControllerResult<Manifest> {
        let mut manifest = Manifest::new();
        if !self.owns(object) {
            debug!(key = %object.key(), "ApisixConsumer belongs to another ingress class");
            return Ok(manifest);
        }
        manifest.consumers.push(self.translator.translate_consumer(object)?);
        Ok(manifest)
    }

    fn status_target(&self, object: &ApisixConsumerObject) -> Option<StatusTarget> {
        if !self.owns(object) {
            return None;
        }
        Some(match object {
            ApisixConsumerObject::V2(consumer) => apisix_status_target(consumer, consumer.status.as_ref()),
            ApisixConsumerObject::V2beta3(consumer) => apisix_status_target(consumer, consumer.status.as_ref()),
        })
    }

    fn dependencies(&self, object: &ApisixConsumerObject) -> Vec<Dependency> {
        let namespace = object.key().namespace;
        let params = object.auth_parameter();
        [
            params.basic_auth.as_ref().and_then(|a| a.secret_ref.as_ref()),
            params.key_auth.as_ref().and_then(|a| a.secret_ref.as_ref()),
            params.jwt_auth.as_ref().and_then(|a| a.secret_ref.as_ref()),
            params.hmac_auth.as_ref().and_then(|a| a.secret_ref.as_ref()),
        ]
        .into_iter()
        .flatten()
        .map(|secret| Dependency::Secret(ObjectKey::new(namespace.as_str(), secret.name.as_str())))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::compose_consumer_name;
    use crate::k8s::crd::{
        ApisixConsumer, ApisixConsumerAuthParameter, ApisixConsumerSpec, ApisixConsumerV2beta3,
        ApisixConsumerV2beta3Spec, AuthSource, KeyAuthValue, LocalObjectReference,
    };
    use crate::translation::testing::translator;

    fn consumer(auth: AuthSource<KeyAuthValue>) -> ApisixConsumerObject {
        let mut consumer = ApisixConsumer::new(
            "jack",
            ApisixConsumerSpec {
                ingress_class_name: None,
                auth_parameter: ApisixConsumerAuthParameter {
                    key_auth: Some(auth),
                    ..Default::default()
                },
            },
        );
        consumer.metadata.namespace = Some("default".to_string());
        consumer.into()
    }

    #[test]
    fn test_manifest_holds_one_consumer() {
        let r = ConsumerReconciler::new(Arc::new(LocalStore::new()), translator(), "apisix");
        let object = consumer(AuthSource {
            value: Some(KeyAuthValue {
                key: "secret-key".to_string(),
            }),
            secret_ref: None,
        });
        let manifest = r.translate(&object).unwrap();
        assert_eq!(manifest.consumers.len(), 1);
        assert_eq!(manifest.consumers[0].username, compose_consumer_name("default", "jack"));
        assert!(r.dependencies(&object).is_empty());
    }

    #[test]
    fn test_secret_ref_is_a_dependency() {
        let r = ConsumerReconciler::new(Arc::new(LocalStore::new()), translator(), "apisix");
        let object = consumer(AuthSource {
            value: None,
            secret_ref: Some(LocalObjectReference {
                name: "jack-key".to_string(),
            }),
        });
        assert_eq!(
            r.dependencies(&object),
            vec![Dependency::Secret(ObjectKey::new("default", "jack-key"))]
        );
    }

    #[test]
    fn test_v2beta3_consumer_reports_on_its_own_version() {
        let r = ConsumerReconciler::new(Arc::new(LocalStore::new()), translator(), "apisix");
        let mut legacy = ApisixConsumerV2beta3::new(
            "jack",
            ApisixConsumerV2beta3Spec {
                auth_parameter: ApisixConsumerAuthParameter {
                    key_auth: Some(AuthSource {
                        value: Some(KeyAuthValue {
                            key: "secret-key".to_string(),
                        }),
                        secret_ref: None,
                    }),
                    ..Default::default()
                },
            },
        );
        legacy.metadata.namespace = Some("default".to_string());
        let object = ApisixConsumerObject::from(legacy);

        let manifest = r.translate(&object).unwrap();
        assert_eq!(manifest.consumers[0].username, compose_consumer_name("default", "jack"));
        let target = r.status_target(&object).unwrap();
        assert_eq!(target.version, "v2beta3");
        assert_eq!(target.kind, "ApisixConsumer");
    }
}
