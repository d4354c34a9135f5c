//! # Gateway Admin Client
//!
//! Typed client of the APISIX admin API with a write-through cache.
//!
//! - `types`: the entities the admin API manages
//! - `cache`: per-kind cache tables and keyed locks
//! - `cluster`: the `ApisixClient` of one gateway cluster
//! - `resource`: per-kind create/update/delete/get/list
//! - `response`: admin API response envelopes

pub mod cache;
pub mod cluster;
pub mod resource;
pub mod response;
pub mod types;

pub use cache::{Cached, GatewayCache, KeyedLocks};
pub use cluster::ApisixClient;
pub use resource::ResourceClient;
pub use types::{
    managed_labels, ClientTls, Consumer, GatewayEntity, GlobalRule, Labels, PluginConfig, Plugins,
    ResourceKind, Route, Ssl, StreamRoute, Timeout, Upstream, UpstreamNode, UpstreamTls,
};
