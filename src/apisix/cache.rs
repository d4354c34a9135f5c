//! # Gateway Cache
//!
//! Write-through cache of every entity the admin API holds. The cache is only
//! mutated after the admin API confirmed a write, so it always describes what
//! the gateway currently serves (modulo changes made behind our back).
//!
//! - `DashMap` per kind for lock-free concurrent reads
//! - `KeyedLocks` serializes mutations of one id while different ids proceed
//!   concurrently

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::apisix::types::{
    Consumer, GatewayEntity, GlobalRule, PluginConfig, ResourceKind, Route, Ssl, StreamRoute, Upstream,
};

/// Per-kind tables keyed by entity id
#[derive(Debug, Default)]
pub struct GatewayCache {
    routes: DashMap<String, Route>,
    upstreams: DashMap<String, Upstream>,
    consumers: DashMap<String, Consumer>,
    plugin_configs: DashMap<String, PluginConfig>,
    global_rules: DashMap<String, GlobalRule>,
    stream_routes: DashMap<String, StreamRoute>,
    ssls: DashMap<String, Ssl>,
}

/// Access to the cache table of an entity kind
pub trait Cached: GatewayEntity {
    fn table(cache: &GatewayCache) -> &DashMap<String, Self>;
}

macro_rules! impl_cached {
    ($ty:ty, $field:ident) => {
        impl Cached for $ty {
            fn table(cache: &GatewayCache) -> &DashMap<String, Self> {
                &cache.$field
            }
        }
    };
}

impl_cached!(Route, routes);
impl_cached!(Upstream, upstreams);
impl_cached!(Consumer, consumers);
impl_cached!(PluginConfig, plugin_configs);
impl_cached!(GlobalRule, global_rules);
impl_cached!(StreamRoute, stream_routes);
impl_cached!(Ssl, ssls);

impl GatewayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Cached>(&self, id: &str) -> Option<T> {
        T::table(self).get(id).map(|entry| entry.value().clone())
    }

    /// All cached entities of a kind, sorted by id
    pub fn list<T: Cached>(&self) -> Vec<T> {
        let mut items: Vec<T> = T::table(self).iter().map(|entry| entry.value().clone()).collect();
        items.sort_by(|a, b| a.id().cmp(b.id()));
        items
    }

    pub fn insert<T: Cached>(&self, entity: T) {
        T::table(self).insert(entity.id().to_string(), entity);
    }

    pub fn remove<T: Cached>(&self, id: &str) -> Option<T> {
        T::table(self).remove(id).map(|(_, entity)| entity)
    }

    pub fn contains<T: Cached>(&self, id: &str) -> bool {
        T::table(self).contains_key(id)
    }

    /// Replace every entity of a kind
    pub fn replace_all<T: Cached>(&self, entities: Vec<T>) {
        let table = T::table(self);
        table.clear();
        for entity in entities {
            table.insert(entity.id().to_string(), entity);
        }
    }

    /// Whether any cached route or stream route still points at `upstream_id`
    ///
    /// Dependents whose id is listed in `ignore` are about to be removed and
    /// do not count.
    pub fn upstream_referenced(&self, upstream_id: &str, ignore: &[&str]) -> bool {
        let by_route = self.routes.iter().any(|entry| {
            let route = entry.value();
            !ignore.contains(&route.id.as_str())
                && (route.upstream_id.as_deref() == Some(upstream_id)
                    || traffic_split_references(route, upstream_id))
        });
        if by_route {
            return true;
        }
        self.stream_routes.iter().any(|entry| {
            let stream_route = entry.value();
            !ignore.contains(&stream_route.id.as_str()) && stream_route.upstream_id == upstream_id
        })
    }

    /// Number of cached entities of a kind
    pub fn count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Route => self.routes.len(),
            ResourceKind::Upstream => self.upstreams.len(),
            ResourceKind::Consumer => self.consumers.len(),
            ResourceKind::PluginConfig => self.plugin_configs.len(),
            ResourceKind::GlobalRule => self.global_rules.len(),
            ResourceKind::StreamRoute => self.stream_routes.len(),
            ResourceKind::Ssl => self.ssls.len(),
        }
    }
}

fn traffic_split_references(route: &Route, upstream_id: &str) -> bool {
    let Some(split) = route.plugins.get("traffic-split") else {
        return false;
    };
    split
        .pointer("/rules")
        .and_then(|rules| rules.as_array())
        .into_iter()
        .flatten()
        .filter_map(|rule| rule.get("weighted_upstreams").and_then(|w| w.as_array()))
        .flatten()
        .any(|weighted| weighted.get("upstream_id").and_then(|id| id.as_str()) == Some(upstream_id))
}

/// Async mutexes keyed by `kind/id`
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        mutex.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
