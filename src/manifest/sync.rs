//! # Synchronizer
//!
//! Applies diffed manifests to the gateway in dependency order:
//!
//! 1. added, then updated: upstreams, consumers, plugin configs, ssls,
//!    global rules, routes, stream routes
//! 2. deleted: routes, stream routes, global rules, plugin configs,
//!    consumers, ssls, upstreams
//!
//! Entities of one kind are written concurrently. When any of them fails the
//! kind still runs to completion, then the sync stops with a retryable error
//! and later kinds are not touched.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::apisix::cache::Cached;
use crate::apisix::cluster::ApisixClient;
use crate::apisix::types::{GatewayEntity, ResourceKind, Upstream};
use crate::core::error::{ControllerError, ControllerResult};
use crate::manifest::Manifest;

/// Pushes manifests to one gateway cluster
#[derive(Debug, Clone)]
pub struct Synchronizer {
    client: Arc<ApisixClient>,
}

impl Synchronizer {
    pub fn new(client: Arc<ApisixClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<ApisixClient> {
        &self.client
    }

    /// Apply the three halves of a diff
    pub async fn sync_manifests(
        &self,
        added: &Manifest,
        updated: &Manifest,
        deleted: &Manifest,
    ) -> ControllerResult<()> {
        if !added.is_empty() {
            debug!(entities = added.len(), "Creating entities");
            self.create_manifest(added).await?;
        }
        if !updated.is_empty() {
            debug!(entities = updated.len(), "Updating entities");
            self.update_manifest(updated).await?;
        }
        if !deleted.is_empty() {
            debug!(entities = deleted.len(), "Deleting entities");
            self.delete_manifest(deleted).await?;
        }
        Ok(())
    }

    async fn create_manifest(&self, m: &Manifest) -> ControllerResult<()> {
        self.create_all(&m.upstreams).await?;
        self.create_all(&m.consumers).await?;
        self.create_all(&m.plugin_configs).await?;
        self.create_all(&m.ssls).await?;
        self.create_all(&m.global_rules).await?;
        self.create_all(&m.routes).await?;
        self.create_all(&m.stream_routes).await
    }

    async fn update_manifest(&self, m: &Manifest) -> ControllerResult<()> {
        self.update_all(&m.upstreams).await?;
        self.update_all(&m.consumers).await?;
        self.update_all(&m.plugin_configs).await?;
        self.update_all(&m.ssls).await?;
        self.update_all(&m.global_rules).await?;
        self.update_all(&m.routes).await?;
        self.update_all(&m.stream_routes).await
    }

    async fn delete_manifest(&self, m: &Manifest) -> ControllerResult<()> {
        self.delete_all(&m.routes).await?;
        self.delete_all(&m.stream_routes).await?;
        self.delete_all(&m.global_rules).await?;
        self.delete_all(&m.plugin_configs).await?;
        self.delete_all(&m.consumers).await?;
        self.delete_all(&m.ssls).await?;

        let leaving: Vec<&str> = m
            .routes
            .iter()
            .map(|r| r.id.as_str())
            .chain(m.stream_routes.iter().map(|s| s.id.as_str()))
            .collect();
        let cache = self.client.cache();
        let upstreams: Vec<Upstream> = m
            .upstreams
            .iter()
            .filter(|u| {
                let referenced = cache.upstream_referenced(&u.id, &leaving);
                if referenced {
                    debug!(upstream = %u.id, "Upstream still referenced, not deleting");
                }
                !referenced
            })
            .cloned()
            .collect();
        self.delete_all(&upstreams).await
    }

    async fn create_all<T: Cached>(&self, items: &[T]) -> ControllerResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let client = self.client.as_ref();
        let results = join_all(
            items
                .iter()
                .map(|item| async move { client.resource::<T>().create(item).await.map(|_| ()) }),
        )
        .await;
        check_results(T::KIND, "create", items, results)
    }

    async fn update_all<T: Cached>(&self, items: &[T]) -> ControllerResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let client = self.client.as_ref();
        let results = join_all(
            items
                .iter()
                .map(|item| async move { client.resource::<T>().update(item).await.map(|_| ()) }),
        )
        .await;
        check_results(T::KIND, "update", items, results)
    }

    async fn delete_all<T: Cached>(&self, items: &[T]) -> ControllerResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let client = self.client.as_ref();
        let results = join_all(
            items
                .iter()
                .map(|item| async move { client.resource::<T>().delete(item).await }),
        )
        .await;
        check_results(T::KIND, "delete", items, results)
    }
}

/// Fold the per-entity results of one kind into a single outcome
fn check_results<T: GatewayEntity>(
    kind: ResourceKind,
    operation: &str,
    items: &[T],
    results: Vec<ControllerResult<()>>,
) -> ControllerResult<()> {
    let mut failed = Vec::new();
    let mut status = None;
    for (item, result) in items.iter().zip(results) {
        if let Err(err) = result {
            warn!(
                resource = kind.as_str(),
                operation = operation,
                id = item.id(),
                error = %err,
                "Gateway operation failed"
            );
            if let ControllerError::RemoteTransient { status: Some(code), .. } = &err {
                status.get_or_insert(*code);
            }
            failed.push(format!("{}: {}", item.id(), err));
        }
    }

    if failed.is_empty() {
        return Ok(());
    }
    Err(ControllerError::remote(
        status,
        format!(
            "{} of {} {} {} operations failed: {}",
            failed.len(),
            items.len(),
            kind.as_str(),
            operation,
            failed.join("; ")
        ),
    ))
}
