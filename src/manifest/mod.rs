//! # Manifest
//!
//! The complete set of gateway entities one source object translates to, and
//! the differ that turns two manifests into the create/update/delete work the
//! synchronizer applies.
//!
//! Entities are matched by id and compared structurally, so a manifest diffed
//! against itself is always empty.

pub mod sync;

use std::collections::HashMap;

use crate::apisix::types::{
    Consumer, GatewayEntity, GlobalRule, PluginConfig, Route, Ssl, StreamRoute, Upstream,
};

pub use sync::Synchronizer;

/// Gateway entities produced by one translation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub routes: Vec<Route>,
    pub upstreams: Vec<Upstream>,
    pub stream_routes: Vec<StreamRoute>,
    pub ssls: Vec<Ssl>,
    pub plugin_configs: Vec<PluginConfig>,
    pub consumers: Vec<Consumer>,
    pub global_rules: Vec<GlobalRule>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
            && self.upstreams.is_empty()
            && self.stream_routes.is_empty()
            && self.ssls.is_empty()
            && self.plugin_configs.is_empty()
            && self.consumers.is_empty()
            && self.global_rules.is_empty()
    }

    /// Total number of entities
    pub fn len(&self) -> usize {
        self.routes.len()
            + self.upstreams.len()
            + self.stream_routes.len()
            + self.ssls.len()
            + self.plugin_configs.len()
            + self.consumers.len()
            + self.global_rules.len()
    }

    /// Add an upstream unless one with the same id is already present
    ///
    /// Several rules pointing at the same service port share one upstream.
    pub fn add_upstream(&mut self, upstream: Upstream) {
        if !self.upstreams.iter().any(|u| u.id == upstream.id) {
            self.upstreams.push(upstream);
        }
    }

    /// Append every entity of `other`, keeping upstreams unique
    pub fn merge(&mut self, other: Manifest) {
        self.routes.extend(other.routes);
        for upstream in other.upstreams {
            self.add_upstream(upstream);
        }
        self.stream_routes.extend(other.stream_routes);
        self.ssls.extend(other.ssls);
        self.plugin_configs.extend(other.plugin_configs);
        self.consumers.extend(other.consumers);
        self.global_rules.extend(other.global_rules);
    }

    /// Add the entities of `other` whose id is not present yet
    pub fn union(&mut self, other: Manifest) {
        extend_unique(&mut self.routes, other.routes);
        extend_unique(&mut self.upstreams, other.upstreams);
        extend_unique(&mut self.stream_routes, other.stream_routes);
        extend_unique(&mut self.ssls, other.ssls);
        extend_unique(&mut self.plugin_configs, other.plugin_configs);
        extend_unique(&mut self.consumers, other.consumers);
        extend_unique(&mut self.global_rules, other.global_rules);
    }

    /// Compute `(added, updated, deleted)` turning `old` into `self`
    pub fn diff(&self, old: &Manifest) -> (Manifest, Manifest, Manifest) {
        let mut added = Manifest::new();
        let mut updated = Manifest::new();
        let mut deleted = Manifest::new();

        macro_rules! diff_kind {
            ($field:ident) => {{
                let (a, u, d) = diff_entities(&self.$field, &old.$field);
                added.$field = a;
                updated.$field = u;
                deleted.$field = d;
            }};
        }

        diff_kind!(routes);
        diff_kind!(upstreams);
        diff_kind!(stream_routes);
        diff_kind!(ssls);
        diff_kind!(plugin_configs);
        diff_kind!(consumers);
        diff_kind!(global_rules);

        (added, updated, deleted)
    }
}

fn extend_unique<T: GatewayEntity>(into: &mut Vec<T>, from: Vec<T>) {
    for entity in from {
        if !into.iter().any(|e| e.id() == entity.id()) {
            into.push(entity);
        }
    }
}

/// Diff two entity lists by id
///
/// Output order follows `new` for added/updated and `old` for deleted.
pub fn diff_entities<T: GatewayEntity>(new: &[T], old: &[T]) -> (Vec<T>, Vec<T>, Vec<T>) {
    let old_by_id: HashMap<&str, &T> = old.iter().map(|e| (e.id(), e)).collect();
    let new_by_id: HashMap<&str, &T> = new.iter().map(|e| (e.id(), e)).collect();

    let mut added = Vec::new();
    let mut updated = Vec::new();
    for entity in new {
        match old_by_id.get(entity.id()) {
            None => added.push(entity.clone()),
            Some(previous) if *previous != entity => updated.push(entity.clone()),
            Some(_) => {}
        }
    }

    let deleted = old
        .iter()
        .filter(|e| !new_by_id.contains_key(e.id()))
        .cloned()
        .collect();

    (added, updated, deleted)
}
