//! Source objects as seen by the controllers.
//!
//! Resources served in several API versions are wrapped in tagged enums so a
//! controller handles one type and the translator picks one function per
//! version.

use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::fmt::Debug;

use crate::core::types::ObjectKey;
use crate::k8s::crd::{
    ApisixConsumer, ApisixConsumerAuthParameter, ApisixConsumerV2beta3, ApisixRoute, ApisixRouteV2beta3, IngressV1beta1,
};

/// Common accessors of every watched object
pub trait SourceObject: Clone + Debug + Send + Sync + 'static {
    fn object_meta(&self) -> &ObjectMeta;

    /// `group/version` the object was read as
    fn group_version(&self) -> String;

    fn key(&self) -> ObjectKey {
        let meta = self.object_meta();
        ObjectKey::new(
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }

    /// `metadata.resourceVersion` as a number, 0 when absent or unparsable
    fn resource_version_number(&self) -> u64 {
        self.object_meta()
            .resource_version
            .as_deref()
            .and_then(|rv| rv.parse().ok())
            .unwrap_or(0)
    }
}

impl<K> SourceObject for K
where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
{
    fn object_meta(&self) -> &ObjectMeta {
        self.meta()
    }

    fn group_version(&self) -> String {
        K::api_version(&()).into_owned()
    }
}

/// An ApisixRoute in any served version
#[derive(Debug, Clone, PartialEq)]
pub enum ApisixRouteObject {
    V2(ApisixRoute),
    V2beta3(ApisixRouteV2beta3),
}

impl SourceObject for ApisixRouteObject {
    fn object_meta(&self) -> &ObjectMeta {
        match self {
            Self::V2(route) => route.meta(),
            Self::V2beta3(route) => route.meta(),
        }
    }

    fn group_version(&self) -> String {
        match self {
            Self::V2(_) => ApisixRoute::api_version(&()).into_owned(),
            Self::V2beta3(_) => ApisixRouteV2beta3::api_version(&()).into_owned(),
        }
    }
}

impl From<ApisixRoute> for ApisixRouteObject {
    fn from(route: ApisixRoute) -> Self {
        Self::V2(route)
    }
}

impl From<ApisixRouteV2beta3> for ApisixRouteObject {
    fn from(route: ApisixRouteV2beta3) -> Self {
        Self::V2beta3(route)
    }
}

/// An ApisixConsumer in any served version
#[derive(Debug, Clone, PartialEq)]
pub enum ApisixConsumerObject {
    V2(ApisixConsumer),
    V2beta3(ApisixConsumerV2beta3),
}

impl ApisixConsumerObject {
    /// Requested ingress class; v2beta3 consumers have none
    pub fn ingress_class(&self) -> Option<&str> {
        match self {
            Self::V2(consumer) => consumer.spec.ingress_class_name.as_deref(),
            Self::V2beta3(_) => None,
        }
    }

    pub fn auth_parameter(&self) -> &ApisixConsumerAuthParameter {
        match self {
            Self::V2(consumer) => &consumer.spec.auth_parameter,
            Self::V2beta3(consumer) => &consumer.spec.auth_parameter,
        }
    }
}

impl SourceObject for ApisixConsumerObject {
    fn object_meta(&self) -> &ObjectMeta {
        match self {
            Self::V2(consumer) => consumer.meta(),
            Self::V2beta3(consumer) => consumer.meta(),
        }
    }

    fn group_version(&self) -> String {
        match self {
            Self::V2(_) => ApisixConsumer::api_version(&()).into_owned(),
            Self::V2beta3(_) => ApisixConsumerV2beta3::api_version(&()).into_owned(),
        }
    }
}

impl From<ApisixConsumer> for ApisixConsumerObject {
    fn from(consumer: ApisixConsumer) -> Self {
        Self::V2(consumer)
    }
}

impl From<ApisixConsumerV2beta3> for ApisixConsumerObject {
    fn from(consumer: ApisixConsumerV2beta3) -> Self {
        Self::V2beta3(consumer)
    }
}

/// An Ingress in any served version
#[derive(Debug, Clone, PartialEq)]
pub enum IngressObject {
    V1(Ingress),
    V1beta1(IngressV1beta1),
}

impl IngressObject {
    /// Class requested through `spec.ingressClassName` or the legacy annotation
    pub fn ingress_class(&self) -> Option<String> {
        let from_spec = match self {
            Self::V1(ing) => ing.spec.as_ref().and_then(|s| s.ingress_class_name.clone()),
            Self::V1beta1(ing) => ing.spec.ingress_class_name.clone(),
        };
        from_spec.or_else(|| self.annotations_ref().get(INGRESS_CLASS_ANNOTATION).cloned())
    }

    fn annotations_ref(&self) -> &std::collections::BTreeMap<String, String> {
        match self {
            Self::V1(ing) => ing.annotations(),
            Self::V1beta1(ing) => ing.annotations(),
        }
    }
}

/// Legacy annotation selecting the ingress class
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

impl SourceObject for IngressObject {
    fn object_meta(&self) -> &ObjectMeta {
        match self {
            Self::V1(ing) => ing.meta(),
            Self::V1beta1(ing) => ing.meta(),
        }
    }

    fn group_version(&self) -> String {
        match self {
            Self::V1(_) => Ingress::api_version(&()).into_owned(),
            Self::V1beta1(_) => IngressV1beta1::api_version(&()).into_owned(),
        }
    }
}

impl From<Ingress> for IngressObject {
    fn from(ing: Ingress) -> Self {
        Self::V1(ing)
    }
}

impl From<IngressV1beta1> for IngressObject {
    fn from(ing: IngressV1beta1) -> Self {
        Self::V1beta1(ing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::crd::ApisixRouteSpec;

    #[test]
    fn test_route_object_accessors() {
        let mut route = ApisixRoute::new("httpbin", ApisixRouteSpec::default());
        route.metadata.namespace = Some("default".to_string());
        route.metadata.resource_version = Some("42".to_string());

        let object = ApisixRouteObject::from(route);
        assert_eq!(object.key(), ObjectKey::new("default", "httpbin"));
        assert_eq!(object.resource_version_number(), 42);
        assert_eq!(object.group_version(), "apisix.apache.org/v2");
    }

    #[test]
    fn test_consumer_object_versions() {
        use crate::k8s::crd::{ApisixConsumerSpec, ApisixConsumerV2beta3Spec};

        let mut v2 = ApisixConsumer::new(
            "jack",
            ApisixConsumerSpec {
                ingress_class_name: Some("apisix".to_string()),
                ..Default::default()
            },
        );
        v2.metadata.namespace = Some("qa".to_string());
        let v2 = ApisixConsumerObject::from(v2);
        assert_eq!(v2.ingress_class(), Some("apisix"));
        assert_eq!(v2.group_version(), "apisix.apache.org/v2");

        let mut legacy = ApisixConsumerV2beta3::new("jack", ApisixConsumerV2beta3Spec::default());
        legacy.metadata.namespace = Some("qa".to_string());
        let legacy = ApisixConsumerObject::from(legacy);
        assert_eq!(legacy.ingress_class(), None);
        assert_eq!(legacy.group_version(), "apisix.apache.org/v2beta3");
        assert_eq!(legacy.key(), v2.key());
        assert_ne!(legacy, v2);
    }

    #[test]
    fn test_unparsable_resource_version_is_zero() {
        let mut route = ApisixRoute::new("httpbin", ApisixRouteSpec::default());
        route.metadata.resource_version = Some("abc".to_string());
        assert_eq!(route.resource_version_number(), 0);
    }

    #[test]
    fn test_ingress_class_sources() {
        let mut ing = Ingress::default();
        ing.metadata.annotations = Some(
            [(INGRESS_CLASS_ANNOTATION.to_string(), "apisix".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(IngressObject::from(ing.clone()).ingress_class().as_deref(), Some("apisix"));

        ing.spec = Some(k8s_openapi::api::networking::v1::IngressSpec {
            ingress_class_name: Some("nginx".to_string()),
            ..Default::default()
        });
        assert_eq!(IngressObject::from(ing).ingress_class().as_deref(), Some("nginx"));
    }
}
