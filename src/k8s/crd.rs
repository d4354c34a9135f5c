//! # Custom Resource Definitions
//!
//! Rust types of every watched resource that `k8s-openapi` does not ship:
//! the `apisix.apache.org` CRDs, the legacy `networking.k8s.io/v1beta1`
//! Ingress and the Gateway API objects the controller understands.
//!
//! Only the fields the translator reads are modelled; unknown fields are
//! ignored on deserialization. Schemas are owned by the CRD manifests, so
//! schema generation is disabled.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Status block shared by the apisix.apache.org resources
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ApisixStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

// ---------------------------------------------------------------------------
// ApisixRoute
// ---------------------------------------------------------------------------

/// ApisixRoute `apisix.apache.org/v2`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixRoute",
    plural = "apisixroutes",
    status = "ApisixStatus",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<ApisixRouteHttp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stream: Vec<ApisixRouteStream>,
}

/// One HTTP rule of an ApisixRoute
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteHttp {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<UpstreamTimeout>,
    #[serde(default, rename = "match")]
    pub route_match: ApisixRouteHttpMatch,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backends: Vec<ApisixRouteBackend>,
    #[serde(default)]
    pub websocket: bool,
    #[serde(default, rename = "plugin_config_name", skip_serializing_if = "Option::is_none")]
    pub plugin_config_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<ApisixRoutePlugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ApisixRouteAuthentication>,
}

/// Durations such as `30s`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct UpstreamTimeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteHttpMatch {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_addrs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exprs: Vec<ApisixRouteHttpMatchExpr>,
}

/// A request matching expression
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ApisixRouteHttpMatchExpr {
    pub subject: ApisixRouteHttpMatchExprSubject,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ApisixRouteHttpMatchExprSubject {
    pub scope: String,
    #[serde(default)]
    pub name: String,
}

/// A service backend of a rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteBackend {
    pub service_name: String,
    pub service_port: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_granularity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
}

/// A plugin attached to a rule, plugin config or global rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRoutePlugin {
    pub name: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteAuthentication {
    #[serde(default)]
    pub enable: bool,
    #[serde(default, rename = "type")]
    pub auth_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_auth: Option<ApisixRouteAuthenticationKeyAuth>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ApisixRouteAuthenticationKeyAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

/// One stream (TCP/UDP) rule of an ApisixRoute
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteStream {
    pub name: String,
    pub protocol: String,
    #[serde(rename = "match")]
    pub stream_match: ApisixRouteStreamMatch,
    pub backend: ApisixRouteBackend,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteStreamMatch {
    pub ingress_port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// ApisixRoute `apisix.apache.org/v2beta3`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apisix.apache.org",
    version = "v2beta3",
    kind = "ApisixRoute",
    root = "ApisixRouteV2beta3",
    plural = "apisixroutes",
    status = "ApisixStatus",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteV2beta3Spec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<ApisixRouteHttpV2beta3>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stream: Vec<ApisixRouteStream>,
}

/// v2beta3 HTTP rule: the v2 rule plus the deprecated single `backend`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ApisixRouteHttpV2beta3 {
    #[serde(flatten)]
    pub rule: ApisixRouteHttp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<ApisixRouteBackend>,
}

// ---------------------------------------------------------------------------
// ApisixConsumer
// ---------------------------------------------------------------------------

/// ApisixConsumer `apisix.apache.org/v2`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixConsumer",
    plural = "apisixconsumers",
    status = "ApisixStatus",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ApisixConsumerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(default)]
    pub auth_parameter: ApisixConsumerAuthParameter,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixConsumerAuthParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<AuthSource<BasicAuthValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_auth: Option<AuthSource<KeyAuthValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_auth: Option<AuthSource<JwtAuthValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac_auth: Option<AuthSource<HmacAuthValue>>,
}

/// Credentials given inline or through a secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSource<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct LocalObjectReference {
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct BasicAuthValue {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct KeyAuthValue {
    pub key: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct JwtAuthValue {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_secret: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_grace_period: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct HmacAuthValue {
    pub access_key: String,
    pub secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_skew: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signed_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_headers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encode_uri_params: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_request_body: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_req_body: Option<i64>,
}

/// ApisixConsumer `apisix.apache.org/v2beta3`, without an ingress class
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apisix.apache.org",
    version = "v2beta3",
    kind = "ApisixConsumer",
    root = "ApisixConsumerV2beta3",
    plural = "apisixconsumers",
    status = "ApisixStatus",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ApisixConsumerV2beta3Spec {
    #[serde(default)]
    pub auth_parameter: ApisixConsumerAuthParameter,
}

// ---------------------------------------------------------------------------
// ApisixGlobalRule / ApisixPluginConfig / ApisixTls
// ---------------------------------------------------------------------------

/// ApisixGlobalRule `apisix.apache.org/v2`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixGlobalRule",
    plural = "apisixglobalrules",
    status = "ApisixStatus",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
pub struct ApisixGlobalRuleSpec {
    #[serde(default)]
    pub plugins: Vec<ApisixRoutePlugin>,
}

/// ApisixPluginConfig `apisix.apache.org/v2`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixPluginConfig",
    plural = "apisixpluginconfigs",
    status = "ApisixStatus",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
pub struct ApisixPluginConfigSpec {
    #[serde(default)]
    pub plugins: Vec<ApisixRoutePlugin>,
}

/// ApisixTls `apisix.apache.org/v2`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixTls",
    plural = "apisixtlses",
    status = "ApisixStatus",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ApisixTlsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    pub hosts: Vec<String>,
    pub secret: ApisixSecret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ApisixMutualTlsClientConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ApisixSecret {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixMutualTlsClientConfig {
    pub ca_secret: ApisixSecret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
}

// ---------------------------------------------------------------------------
// ApisixUpstream
// ---------------------------------------------------------------------------

/// ApisixUpstream `apisix.apache.org/v2`
///
/// Carries the settings of the upstreams built for the Service of the same
/// name and namespace.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixUpstream",
    plural = "apisixupstreams",
    status = "ApisixStatus",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ApisixUpstreamSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(flatten)]
    pub config: ApisixUpstreamConfig,
    /// Overrides for single service ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_level_settings: Vec<ApisixUpstreamPortLevelSettings>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApisixUpstreamConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loadbalancer: Option<LoadBalancer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<UpstreamTimeout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<ApisixSecret>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ApisixUpstreamPortLevelSettings {
    pub port: i32,
    #[serde(flatten)]
    pub config: ApisixUpstreamConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    #[serde(rename = "type")]
    pub lb_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct HealthCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveHealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive: Option<PassiveHealthCheck>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveHealthCheck {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub check_type: Option<String>,
    /// Duration such as `5s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_path: Option<String>,
    #[serde(default, rename = "strictTLS", skip_serializing_if = "Option::is_none")]
    pub strict_tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<ActiveHealthCheckHealthy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy: Option<ActiveHealthCheckUnhealthy>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveHealthCheckHealthy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_codes: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successes: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveHealthCheckUnhealthy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_codes: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_failures: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_failures: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PassiveHealthCheck {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub check_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<PassiveHealthCheckHealthy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy: Option<ActiveHealthCheckUnhealthy>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PassiveHealthCheckHealthy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_codes: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successes: Option<i32>,
}

// ---------------------------------------------------------------------------
// Ingress networking.k8s.io/v1beta1
// ---------------------------------------------------------------------------

/// Ingress `networking.k8s.io/v1beta1`, removed from `k8s-openapi`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "networking.k8s.io",
    version = "v1beta1",
    kind = "Ingress",
    root = "IngressV1beta1",
    plural = "ingresses",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct IngressV1beta1Spec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<IngressBackendV1beta1>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<IngressTlsV1beta1>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<IngressRuleV1beta1>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressBackendV1beta1 {
    pub service_name: String,
    pub service_port: IntOrString,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressTlsV1beta1 {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct IngressRuleV1beta1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpIngressRuleValueV1beta1>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct HttpIngressRuleValueV1beta1 {
    pub paths: Vec<HttpIngressPathV1beta1>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressPathV1beta1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_type: Option<String>,
    pub backend: IngressBackendV1beta1,
}

// ---------------------------------------------------------------------------
// Gateway API
// ---------------------------------------------------------------------------

/// Gateway `gateway.networking.k8s.io/v1beta1`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1beta1",
    kind = "Gateway",
    plural = "gateways",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    pub gateway_class_name: String,
    #[serde(default)]
    pub listeners: Vec<GatewayListener>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct GatewayListener {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub port: i32,
    pub protocol: String,
}

/// TCPRoute `gateway.networking.k8s.io/v1alpha2`
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "TCPRoute",
    plural = "tcproutes",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TCPRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    #[serde(default)]
    pub rules: Vec<TCPRouteRule>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TCPRouteRule {
    #[serde(default)]
    pub backend_refs: Vec<BackendRef>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct BackendRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;
    use serde_json::json;

    #[test]
    fn test_apisix_route_v2_deserialization() {
        let value = json!({
            "apiVersion": "apisix.apache.org/v2",
            "kind": "ApisixRoute",
            "metadata": {"name": "httpbin", "namespace": "default", "resourceVersion": "12"},
            "spec": {
                "http": [{
                    "name": "r1",
                    "match": {"paths": ["/ip"], "hosts": ["httpbin.org"]},
                    "backends": [{"serviceName": "httpbin", "servicePort": 80}],
                    "plugin_config_name": "echo",
                    "plugins": [{"name": "cors", "enable": true}]
                }]
            }
        });
        let route: ApisixRoute = serde_json::from_value(value).unwrap();
        let rule = &route.spec.http[0];
        assert_eq!(rule.route_match.paths, vec!["/ip"]);
        assert_eq!(rule.backends[0].service_port, Some(IntOrString::Int(80)));
        assert_eq!(rule.plugin_config_name.as_deref(), Some("echo"));
    }

    #[test]
    fn test_apisix_route_v2beta3_deprecated_backend() {
        let value = json!({
            "apiVersion": "apisix.apache.org/v2beta3",
            "kind": "ApisixRoute",
            "metadata": {"name": "legacy", "namespace": "default"},
            "spec": {
                "http": [{
                    "name": "r1",
                    "match": {"paths": ["/*"]},
                    "backend": {"serviceName": "httpbin", "servicePort": "http"}
                }]
            }
        });
        let route: ApisixRouteV2beta3 = serde_json::from_value(value).unwrap();
        let rule = &route.spec.http[0];
        assert_eq!(rule.rule.name, "r1");
        assert!(rule.rule.backends.is_empty());
        assert_eq!(
            rule.backend.as_ref().unwrap().service_port,
            Some(IntOrString::String("http".to_string()))
        );
    }

    #[test]
    fn test_versioned_roots_compare_by_value() {
        let legacy = ApisixRouteV2beta3::new("legacy", ApisixRouteV2beta3Spec::default());
        assert_eq!(legacy.clone(), legacy);
        assert_ne!(legacy, ApisixRouteV2beta3::new("other", ApisixRouteV2beta3Spec::default()));

        let ing = IngressV1beta1::new("web", IngressV1beta1Spec::default());
        assert_eq!(IngressV1beta1::api_version(&()), "networking.k8s.io/v1beta1");
        assert_eq!(ing.clone(), ing);
        assert_eq!(ApisixConsumerV2beta3::api_version(&()), "apisix.apache.org/v2beta3");
    }

    #[test]
    fn test_apisix_upstream_deserialization() {
        let value = json!({
            "apiVersion": "apisix.apache.org/v2",
            "kind": "ApisixUpstream",
            "metadata": {"name": "httpbin", "namespace": "default"},
            "spec": {
                "scheme": "https",
                "loadbalancer": {"type": "chash", "hashOn": "header", "key": "user-agent"},
                "retries": 3,
                "tlsSecret": {"name": "client-cert", "namespace": "default"},
                "healthCheck": {
                    "active": {"type": "http", "httpPath": "/healthz", "healthy": {"interval": "2s", "httpCodes": [200]}}
                },
                "portLevelSettings": [{"port": 8443, "scheme": "grpcs"}]
            }
        });
        let upstream: ApisixUpstream = serde_json::from_value(value).unwrap();
        let config = &upstream.spec.config;
        assert_eq!(config.scheme.as_deref(), Some("https"));
        assert_eq!(config.loadbalancer.as_ref().unwrap().hash_on.as_deref(), Some("header"));
        assert_eq!(config.tls_secret.as_ref().unwrap().name, "client-cert");
        let active = config.health_check.as_ref().unwrap().active.as_ref().unwrap();
        assert_eq!(active.http_path.as_deref(), Some("/healthz"));
        assert_eq!(active.healthy.as_ref().unwrap().http_codes, vec![200]);
        assert_eq!(upstream.spec.port_level_settings[0].port, 8443);
        assert_eq!(upstream.spec.port_level_settings[0].config.scheme.as_deref(), Some("grpcs"));
    }

    #[test]
    fn test_tcp_route_deserialization() {
        let value = json!({
            "apiVersion": "gateway.networking.k8s.io/v1alpha2",
            "kind": "TCPRoute",
            "metadata": {"name": "tcp", "namespace": "default"},
            "spec": {
                "parentRefs": [{"name": "gw", "sectionName": "tcp"}],
                "rules": [{"backendRefs": [{"name": "redis", "port": 6379}]}]
            }
        });
        let route: TCPRoute = serde_json::from_value(value).unwrap();
        assert_eq!(route.spec.parent_refs[0].section_name.as_deref(), Some("tcp"));
        assert_eq!(route.spec.rules[0].backend_refs[0].port, Some(6379));
    }
}
