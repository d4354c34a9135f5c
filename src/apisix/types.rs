//! # Gateway Entities
//!
//! Canonical representation of the objects the admin API manages. Field names
//! and JSON shapes follow the admin API so values can be sent and cached
//! without a mapping layer. Optional fields are omitted from the JSON body when
//! absent and plugin configurations stay opaque JSON objects.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Plugin name -> plugin configuration
///
/// A `BTreeMap` keeps serialization byte-stable across runs.
pub type Plugins = BTreeMap<String, serde_json::Value>;

/// Entity labels
pub type Labels = BTreeMap<String, String>;

/// Label set on every entity the controller owns
pub const LABEL_MANAGED_BY: &str = "managed-by";

/// Value of the `managed-by` label
pub const MANAGED_BY_VALUE: &str = "apisix-ingress-controller";

/// Labels every controller-owned entity carries
pub fn managed_labels() -> Labels {
    let mut labels = Labels::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels
}

/// Kinds of entities the admin API exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Route,
    Upstream,
    Consumer,
    PluginConfig,
    GlobalRule,
    StreamRoute,
    Ssl,
}

impl ResourceKind {
    /// Every kind, in the order the cache is populated
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Upstream,
        ResourceKind::Consumer,
        ResourceKind::PluginConfig,
        ResourceKind::Ssl,
        ResourceKind::GlobalRule,
        ResourceKind::Route,
        ResourceKind::StreamRoute,
    ];

    /// Path segment of the kind in the admin API
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Route => "routes",
            Self::Upstream => "upstreams",
            Self::Consumer => "consumers",
            Self::PluginConfig => "plugin_configs",
            Self::GlobalRule => "global_rules",
            Self::StreamRoute => "stream_routes",
            Self::Ssl => "ssls",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Upstream => "upstream",
            Self::Consumer => "consumer",
            Self::PluginConfig => "plugin_config",
            Self::GlobalRule => "global_rule",
            Self::StreamRoute => "stream_route",
            Self::Ssl => "ssl",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common behaviour of every gateway entity
pub trait GatewayEntity:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    const KIND: ResourceKind;

    /// Admin API key of the entity (the username for consumers)
    fn id(&self) -> &str;

    /// Set the key assigned by the admin API
    fn set_id(&mut self, id: String);
}

/// A backend node of an upstream
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpstreamNode {
    pub host: String,
    pub port: i32,
    pub weight: i32,
}

/// Connect/send/read timeouts in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Timeout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<u64>,
}

/// Client certificate used towards an https upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamTls {
    pub client_cert: String,
    pub client_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Route {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_addrs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Plugins::is_empty")]
    pub plugins: Plugins,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_config_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_websocket: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,
}

impl GatewayEntity for Route {
    const KIND: ResourceKind = ResourceKind::Route;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Load balancing algorithm (`roundrobin`, `chash`, `ewma`, `least_conn`)
    #[serde(rename = "type", default = "default_lb_type")]
    pub lb_type: String,
    /// Hash input of `chash` (`vars`, `header`, `cookie`, `consumer`, `vars_combinations`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default)]
    pub nodes: Vec<UpstreamNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<UpstreamTls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,
}

fn default_lb_type() -> String {
    "roundrobin".to_string()
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            labels: Labels::new(),
            lb_type: default_lb_type(),
            hash_on: None,
            key: None,
            scheme: None,
            nodes: Vec::new(),
            checks: None,
            tls: None,
            retries: None,
            timeout: None,
        }
    }
}

impl GatewayEntity for Upstream {
    const KIND: ResourceKind = ResourceKind::Upstream;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Consumers are keyed by username in the admin API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Consumer {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Plugins::is_empty")]
    pub plugins: Plugins,
}

impl GatewayEntity for Consumer {
    const KIND: ResourceKind = ResourceKind::Consumer;

    fn id(&self) -> &str {
        &self.username
    }

    fn set_id(&mut self, id: String) {
        self.username = id;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PluginConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default)]
    pub plugins: Plugins,
}

impl GatewayEntity for PluginConfig {
    const KIND: ResourceKind = ResourceKind::PluginConfig;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GlobalRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub plugins: Plugins,
}

impl GatewayEntity for GlobalRule {
    const KIND: ResourceKind = ResourceKind::GlobalRule;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StreamRoute {
    #[serde(default)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default)]
    pub upstream_id: String,
}

impl GatewayEntity for StreamRoute {
    const KIND: ResourceKind = ResourceKind::StreamRoute;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Client certificate verification settings of an SSL object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTls {
    pub ca: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Ssl {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub snis: Vec<String>,
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientTls>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl GatewayEntity for Ssl {
    const KIND: ResourceKind = ResourceKind::Ssl;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
