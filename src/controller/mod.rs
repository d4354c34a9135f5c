//! # Controllers
//!
//! One controller per watched kind. Every controller runs the same loop:
//!
//! 1. informer notifications are filtered (namespace, resource version) and
//!    queued as [`Event`]s
//! 2. workers pop events, re-read the current object from the store and
//!    classify the event as stale or live
//! 3. live events are translated, diffed against the previous manifest and
//!    pushed through the [`Synchronizer`]
//! 4. the outcome is reported in the object's status and failures are
//!    retried with per-key backoff
//!
//! What differs per kind (translation, status target, referenced services
//! and secrets, post-sync hooks) lives behind the [`Reconciler`] trait.
//!
//! ## Rust Concepts Used
//!
//! - associated types tie a reconciler to the object type it handles
//! - `Arc<Controller<R>>` is shared by the notification pump and every worker
//! - `DashMap` keeps per-key bookkeeping without a global lock

pub mod apisix_route;
pub mod consumer;
pub mod gateway;
pub mod global_rule;
pub mod ingress;
pub mod plugin_config;
pub mod provider;
pub mod tcp_route;
pub mod tls;

use async_trait::async_trait;
use dashmap::DashMap;
use kube::Resource;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::ControllerConfig;
use crate::core::error::{ControllerError, ControllerResult};
use crate::core::types::{Event, EventType, ObjectKey};
use crate::k8s::crd::{ApisixRoutePlugin, ApisixStatus};
use crate::k8s::objects::SourceObject;
use crate::k8s::status::{StatusRecorder, StatusTarget, SyncOutcome};
use crate::k8s::store::{LocalStore, Notification};
use crate::manifest::sync::Synchronizer;
use crate::manifest::Manifest;
use crate::observability::metrics::{ControllerMetrics, SyncResult};
use crate::queue::{ItemExponentialBackoff, WorkQueue};

pub use provider::ControllerProvider;

/// An object a source object's translation reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    Service(ObjectKey),
    Secret(ObjectKey),
}

/// Kind specific part of a controller
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Object: SourceObject;

    /// Kind name used in logs and metrics
    const KIND: &'static str;

    fn store(&self) -> &Arc<LocalStore<Self::Object>>;

    /// Desired gateway state of one object
    fn translate(&self, object: &Self::Object) -> ControllerResult<Manifest>;

    /// Where the sync outcome is reported, if anywhere
    fn status_target(&self, _object: &Self::Object) -> Option<StatusTarget> {
        None
    }

    /// Services and secrets the translation of `object` reads
    fn dependencies(&self, _object: &Self::Object) -> Vec<Dependency> {
        Vec::new()
    }

    /// Runs after the manifest was applied
    ///
    /// `current` is the object in the store, `None` for deletions.
    async fn after_sync(&self, _event: &Event<Self::Object>, _current: Option<&Self::Object>) -> ControllerResult<()> {
        Ok(())
    }
}

/// Shared collaborators of every controller
#[derive(Clone)]
pub struct ControllerContext {
    pub synchronizer: Synchronizer,
    pub status: Arc<dyn StatusRecorder>,
    pub metrics: ControllerMetrics,
    pub config: Arc<ControllerConfig>,
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("synchronizer", &self.synchronizer)
            .finish()
    }
}

/// Kind independent operations the provider triggers on controllers
pub trait ControllerHandle: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Queue every stored object again
    fn resync(&self) -> usize;

    /// Queue every object whose translation reads `dependency`
    fn requeue_dependents(&self, dependency: &Dependency) -> usize;
}

/// Event loop of one kind
pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    queue: WorkQueue<Event<R::Object>>,
    context: ControllerContext,
    last_versions: DashMap<ObjectKey, u64>,
    last_manifests: DashMap<ObjectKey, Manifest>,
}

impl<R: Reconciler> std::fmt::Debug for Controller<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("kind", &R::KIND)
            .field("queued", &self.queue.len())
            .field("synced_objects", &self.last_manifests.len())
            .finish()
    }
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: R, context: ControllerContext) -> Self {
        let reconcile = &context.config.controller;
        let limiter = ItemExponentialBackoff::new(reconcile.base_retry_delay, reconcile.max_retry_delay);
        Self {
            reconciler: Arc::new(reconciler),
            queue: WorkQueue::new(R::KIND, limiter),
            context,
            last_versions: DashMap::new(),
            last_manifests: DashMap::new(),
        }
    }

    pub fn reconciler(&self) -> &Arc<R> {
        &self.reconciler
    }

    pub fn queue(&self) -> &WorkQueue<Event<R::Object>> {
        &self.queue
    }

    /// Manifest applied by the last successful sync of `key`
    pub fn last_manifest(&self, key: &ObjectKey) -> Option<Manifest> {
        self.last_manifests.get(key).map(|entry| entry.value().clone())
    }

    fn watches(&self, key: &ObjectKey) -> bool {
        self.context.config.kubernetes.watches_namespace(&key.namespace)
    }

    fn enqueue(&self, event: Event<R::Object>) {
        self.context.metrics.record_event(R::KIND, event.event_type);
        debug!(resource = R::KIND, key = %event.key, event = %event.event_type, "Queueing event");
        self.queue.add(event);
        self.context.metrics.set_queue_depth(R::KIND, self.queue.len());
    }

    /// Turn an informer notification into a queued event
    ///
    /// Objects outside the watched namespaces are ignored, as are updates that
    /// do not advance the resource version.
    pub fn handle_notification(&self, notification: Notification<R::Object>) {
        let event = match notification {
            Notification::Added(object) => Event::add(object.key(), object.group_version()),
            Notification::Updated { old, new } => {
                let (old_rv, new_rv) = (old.resource_version_number(), new.resource_version_number());
                if new_rv != 0 && new_rv <= old_rv {
                    debug!(resource = R::KIND, key = %new.key(), "Update without newer resourceVersion, ignoring");
                    return;
                }
                Event::update(new.key(), new.group_version(), old)
            }
            Notification::Deleted(object) => Event::delete(object.key(), object.group_version(), object),
        };

        if !self.watches(&event.key) {
            return;
        }
        self.enqueue(event);
    }

    /// Feed notifications into the queue and run workers until cancelled
    ///
    /// Workers start once the store completed its initial list and the
    /// gateway cache is loaded. Notifications arriving before that are
    /// queued.
    pub async fn run(self: Arc<Self>, mut notifications: mpsc::Receiver<Notification<R::Object>>, cancel: CancellationToken) {
        info!(resource = R::KIND, "Starting controller");

        let pump = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        notification = notifications.recv() => match notification {
                            Some(notification) => this.handle_notification(notification),
                            None => break,
                        },
                    }
                }
            })
        };

        let ready = async {
            self.reconciler.store().wait_synced().await;
            self.context.synchronizer.client().wait_ready().await;
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                self.queue.shutdown();
                let _ = pump.await;
                info!(resource = R::KIND, "Controller stopped before caches synced");
                return;
            }
            _ = ready => {}
        }

        let workers = self.context.config.controller.workers.max(1);
        info!(resource = R::KIND, workers = workers, "Caches synced, starting workers");
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let this = self.clone();
                tokio::spawn(async move { this.run_worker(id).await })
            })
            .collect();

        cancel.cancelled().await;
        self.queue.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
        let _ = pump.await;
        info!(resource = R::KIND, "Controller stopped");
    }

    async fn run_worker(&self, id: usize) {
        debug!(resource = R::KIND, worker = id, "Worker started");
        while self.process_next().await {}
        debug!(resource = R::KIND, worker = id, "Worker stopped");
    }

    /// Process one queued event; `false` once the queue is shut down
    pub async fn process_next(&self) -> bool {
        let Some(event) = self.queue.get().await else {
            return false;
        };
        let key = event.key.clone();
        let result = self.sync(&event).await;
        self.queue.done(&key);
        self.handle_sync_result(event, result).await;
        self.context.metrics.set_queue_depth(R::KIND, self.queue.len());
        true
    }

    async fn sync(&self, event: &Event<R::Object>) -> ControllerResult<()> {
        let current = self.reconciler.store().get(&event.key);

        let (new, old) = match (event.event_type, current.as_deref()) {
            (EventType::Delete, Some(_)) => {
                return Err(ControllerError::stale("object exists again, discarding delete"));
            }
            (EventType::Delete, None) => (Manifest::new(), self.deleted_manifest(event)?),
            (_, None) => {
                return Err(ControllerError::stale("object was deleted before it was processed"));
            }
            (EventType::Add, Some(object)) => {
                let new = self.reconciler.translate(object)?;
                (new, self.last_manifest(&event.key).unwrap_or_default())
            }
            (EventType::Update, Some(object)) => {
                self.check_version(&event.key, object)?;
                let new = self.reconciler.translate(object)?;
                (new, self.previous_manifest(event))
            }
        };

        let (added, updated, deleted) = new.diff(&old);
        debug!(
            resource = R::KIND,
            key = %event.key,
            added = added.len(),
            updated = updated.len(),
            deleted = deleted.len(),
            "Applying manifest diff"
        );
        self.context
            .synchronizer
            .sync_manifests(&added, &updated, &deleted)
            .await?;
        self.reconciler.after_sync(event, current.as_deref()).await?;

        match current {
            Some(object) => {
                self.last_versions
                    .insert(event.key.clone(), object.resource_version_number());
                self.last_manifests.insert(event.key.clone(), new);
            }
            None => {
                self.last_versions.remove(&event.key);
                self.last_manifests.remove(&event.key);
            }
        }
        Ok(())
    }

    fn check_version(&self, key: &ObjectKey, object: &R::Object) -> ControllerResult<()> {
        let current = object.resource_version_number();
        if current == 0 {
            return Ok(());
        }
        match self.last_versions.get(key) {
            Some(last) if current <= *last => Err(ControllerError::stale(format!(
                "resourceVersion {} already processed (last {})",
                current, *last
            ))),
            _ => Ok(()),
        }
    }

    /// Baseline an update is diffed against
    ///
    /// The last synced manifest is what the gateway holds, whatever events
    /// were coalesced in the queue since. The old object is only translated
    /// when nothing was synced for the key yet; if that fails too the new
    /// manifest is applied as an upsert.
    fn previous_manifest(&self, event: &Event<R::Object>) -> Manifest {
        if let Some(last) = self.last_manifest(&event.key) {
            return last;
        }
        match event.old_object.as_deref().map(|old| self.reconciler.translate(old)) {
            Some(Ok(manifest)) => manifest,
            Some(Err(err)) => {
                warn!(
                    resource = R::KIND,
                    key = %event.key,
                    error = %err,
                    "Failed to translate previous object, applying as upsert"
                );
                Manifest::new()
            }
            None => Manifest::new(),
        }
    }

    /// Manifest to remove for a deleted object
    ///
    /// Union of the last synced manifest and the tombstone's translation, so
    /// entities synced from an older version of the object go as well.
    fn deleted_manifest(&self, event: &Event<R::Object>) -> ControllerResult<Manifest> {
        let translated = match event.tombstone.as_deref() {
            Some(tombstone) => self.reconciler.translate(tombstone),
            None => Err(ControllerError::internal("delete event without tombstone")),
        };
        match (translated, self.last_manifest(&event.key)) {
            (Ok(manifest), Some(mut last)) => {
                last.union(manifest);
                Ok(last)
            }
            (Ok(manifest), None) => Ok(manifest),
            (Err(err), Some(last)) => {
                warn!(
                    resource = R::KIND,
                    key = %event.key,
                    error = %err,
                    "Failed to translate tombstone, deleting last synced entities"
                );
                Ok(last)
            }
            (Err(err), None) => Err(err),
        }
    }

    async fn handle_sync_result(&self, event: Event<R::Object>, result: ControllerResult<()>) {
        let key = event.key.clone();
        let metrics = &self.context.metrics;

        match result {
            Ok(()) => {
                self.queue.forget(&key);
                metrics.record_sync_operation(R::KIND, SyncResult::Success);
                info!(resource = R::KIND, key = %key, event = %event.event_type, "Synced");
                self.record_status(&key, SyncOutcome::Synced).await;
            }
            Err(err) if err.is_stale() => {
                self.queue.forget(&key);
                if event.event_type == EventType::Delete {
                    warn!(resource = R::KIND, key = %key, reason = %err, "Discarding stale delete event");
                } else {
                    info!(resource = R::KIND, key = %key, reason = %err, "Discarding stale event");
                }
            }
            Err(err) if err.is_retryable() => {
                metrics.record_sync_operation(R::KIND, SyncResult::Failure);
                let attempts = self.queue.num_requeues(&key);
                if attempts < self.context.config.controller.max_retries {
                    warn!(
                        resource = R::KIND,
                        key = %key,
                        attempt = attempts + 1,
                        error = %err,
                        "Sync failed, retrying"
                    );
                    self.queue.add_rate_limited(event);
                } else {
                    error!(
                        resource = R::KIND,
                        key = %key,
                        attempts = attempts,
                        error = %err,
                        "Sync failed, giving up"
                    );
                    self.queue.forget(&key);
                    self.record_status(&key, SyncOutcome::Aborted(err.to_string())).await;
                }
            }
            Err(err) => {
                metrics.record_sync_operation(R::KIND, SyncResult::Failure);
                error!(
                    resource = R::KIND,
                    key = %key,
                    error_type = err.error_type(),
                    error = %err,
                    "Sync failed permanently"
                );
                self.queue.forget(&key);
                self.record_status(&key, SyncOutcome::Aborted(err.to_string())).await;
            }
        }
    }

    /// Report an outcome on the object currently stored under `key`
    async fn record_status(&self, key: &ObjectKey, outcome: SyncOutcome) {
        let Some(object) = self.reconciler.store().get(key) else {
            return;
        };
        let Some(target) = self.reconciler.status_target(&object) else {
            return;
        };
        if target.reports(&outcome) {
            return;
        }

        match self.context.status.record(&target, &outcome).await {
            Ok(()) => self.context.metrics.record_status_update(R::KIND, SyncResult::Success),
            Err(err) => {
                warn!(resource = R::KIND, key = %key, error = %err, "Failed to record status");
                self.context.metrics.record_status_update(R::KIND, SyncResult::Failure);
            }
        }
    }
}

impl<R: Reconciler> ControllerHandle for Controller<R> {
    fn kind(&self) -> &'static str {
        R::KIND
    }

    fn resync(&self) -> usize {
        let mut queued = 0;
        for object in self.reconciler.store().list() {
            let key = object.key();
            if self.watches(&key) {
                self.queue.add(Event::add(key, object.group_version()));
                queued += 1;
            }
        }
        debug!(resource = R::KIND, queued = queued, "Resync");
        queued
    }

    fn requeue_dependents(&self, dependency: &Dependency) -> usize {
        let mut queued = 0;
        for object in self.reconciler.store().list() {
            let key = object.key();
            if self.watches(&key) && self.reconciler.dependencies(&object).contains(dependency) {
                self.queue.add(Event::add(key, object.group_version()));
                queued += 1;
            }
        }
        if queued > 0 {
            debug!(resource = R::KIND, dependency = ?dependency, queued = queued, "Requeued dependents");
        }
        queued
    }
}

/// Status target of an `apisix.apache.org` object
pub(crate) fn apisix_status_target<K>(object: &K, status: Option<&ApisixStatus>) -> StatusTarget
where
    K: Resource<DynamicType = ()> + SourceObject,
{
    let conditions = status.map(|s| s.conditions.as_slice()).unwrap_or_default();
    StatusTarget::for_object(object, conditions)
}

/// Secrets referenced by plugin entries
pub(crate) fn plugin_secret_dependencies(namespace: &str, plugins: &[ApisixRoutePlugin]) -> Vec<Dependency> {
    plugins
        .iter()
        .filter(|p| p.enable)
        .filter_map(|p| p.secret_ref.as_ref())
        .map(|name| Dependency::Secret(ObjectKey::new(namespace, name.as_str())))
        .collect()
}

/// Whether an object asking for `requested` belongs to this controller
///
/// Objects without a class are always handled.
pub(crate) fn matches_class(requested: Option<&str>, configured: &str) -> bool {
    requested.map_or(true, |class| class == configured)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Harness driving a controller against a fake admin API.

    use super::*;
    use crate::apisix::cluster::ApisixClient;
    use crate::core::config::ApisixConfig;
    use crate::k8s::status::NoopStatusRecorder;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Requests seen by the fake admin API, as `METHOD /kind/id`
    pub type RequestLog = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Default)]
    struct FakeAdmin {
        log: RequestLog,
        fail_writes: Arc<Mutex<bool>>,
    }

    async fn list(Path(_kind): Path<String>) -> Json<Value> {
        Json(json!({"total": 0, "list": []}))
    }

    async fn write(
        State(admin): State<FakeAdmin>,
        Path((kind, id)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        admin.log.lock().push(format!("PUT /{}/{}", kind, id));
        if *admin.fail_writes.lock() {
            return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error_msg": "unavailable"})));
        }
        (
            StatusCode::OK,
            Json(json!({"key": format!("/apisix/{}/{}", kind, id), "value": body})),
        )
    }

    async fn remove(State(admin): State<FakeAdmin>, Path((kind, id)): Path<(String, String)>) -> StatusCode {
        admin.log.lock().push(format!("DELETE /{}/{}", kind, id));
        StatusCode::OK
    }

    /// A fake admin API and a ready client pointing at it
    pub struct Harness {
        pub client: Arc<ApisixClient>,
        pub log: RequestLog,
        fail_writes: Arc<Mutex<bool>>,
    }

    impl Harness {
        pub async fn start() -> Self {
            let admin = FakeAdmin::default();
            let app = Router::new()
                .route("/apisix/admin/:kind", get(list))
                .route("/apisix/admin/:kind/:id", put(write).delete(remove))
                .with_state(admin.clone());
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let config = ApisixConfig {
                admin_base_url: format!("http://{}/apisix/admin", addr),
                admin_key: "test".to_string(),
                timeout: Duration::from_secs(2),
            };
            let client = Arc::new(ApisixClient::new(&config).unwrap());
            client.sync_cache().await.unwrap();
            Self {
                client,
                log: admin.log,
                fail_writes: admin.fail_writes,
            }
        }

        pub fn fail_writes(&self, fail: bool) {
            *self.fail_writes.lock() = fail;
        }

        pub fn take_log(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.lock())
        }

        pub fn context(&self, max_retries: u32) -> ControllerContext {
            let mut config = ControllerConfig::default();
            config.controller.max_retries = max_retries;
            config.controller.base_retry_delay = Duration::from_millis(10);
            config.controller.max_retry_delay = Duration::from_millis(20);
            ControllerContext {
                synchronizer: Synchronizer::new(self.client.clone()),
                status: Arc::new(NoopStatusRecorder),
                metrics: ControllerMetrics::new(),
                config: Arc::new(config),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Harness;
    use super::*;
    use crate::apisix::types::{managed_labels, Route};
    use crate::identity::gen_id;
    use crate::k8s::crd::{ApisixTls, ApisixTlsSpec};
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Translates an ApisixTls into one route per host; a host named
    /// `invalid` makes the translation fail terminally.
    struct HostRoutes {
        store: Arc<LocalStore<ApisixTls>>,
        statuses: Arc<Mutex<Vec<SyncOutcome>>>,
    }

    #[async_trait]
    impl Reconciler for HostRoutes {
        type Object = ApisixTls;
        const KIND: &'static str = "HostRoutes";

        fn store(&self) -> &Arc<LocalStore<ApisixTls>> {
            &self.store
        }

        fn translate(&self, object: &ApisixTls) -> ControllerResult<Manifest> {
            let mut manifest = Manifest::new();
            for host in &object.spec.hosts {
                if host == "invalid" {
                    return Err(ControllerError::malformed("invalid host"));
                }
                let name = format!("{}_{}", object.key().name, host);
                manifest.routes.push(Route {
                    id: gen_id(&name),
                    name,
                    labels: managed_labels(),
                    host: Some(host.clone()),
                    uri: Some("/*".to_string()),
                    ..Default::default()
                });
            }
            Ok(manifest)
        }

        async fn after_sync(&self, _event: &Event<ApisixTls>, current: Option<&ApisixTls>) -> ControllerResult<()> {
            if current.is_some() {
                self.statuses.lock().push(SyncOutcome::Synced);
            }
            Ok(())
        }
    }

    fn tls(name: &str, rv: &str, hosts: &[&str]) -> ApisixTls {
        let mut object = ApisixTls::new(
            name,
            ApisixTlsSpec {
                hosts: hosts.iter().map(|h| h.to_string()).collect(),
                ..Default::default()
            },
        );
        object.metadata.namespace = Some("default".to_string());
        object.metadata.resource_version = Some(rv.to_string());
        object
    }

    async fn controller(harness: &Harness, max_retries: u32) -> Controller<HostRoutes> {
        let reconciler = HostRoutes {
            store: Arc::new(LocalStore::new()),
            statuses: Arc::new(Mutex::new(Vec::new())),
        };
        Controller::new(reconciler, harness.context(max_retries))
    }

    fn apply(controller: &Controller<HostRoutes>, object: ApisixTls) {
        let notification = controller.reconciler().store().apply(object);
        controller.handle_notification(notification);
    }

    fn route_path(name: &str) -> String {
        format!("PUT /routes/{}", gen_id(name))
    }

    #[tokio::test]
    async fn test_add_update_delete_lifecycle() {
        let harness = Harness::start().await;
        let c = controller(&harness, 3).await;

        apply(&c, tls("a", "1", &["one.org"]));
        assert!(c.process_next().await);
        assert_eq!(harness.take_log(), vec![route_path("a_one.org")]);

        apply(&c, tls("a", "2", &["two.org"]));
        assert!(c.process_next().await);
        assert_eq!(
            harness.take_log(),
            vec![route_path("a_two.org"), format!("DELETE /routes/{}", gen_id("a_one.org"))]
        );

        let stored = c.reconciler().store().get(&ObjectKey::new("default", "a")).unwrap();
        let notification = c.reconciler().store().delete((*stored).clone());
        c.handle_notification(notification);
        assert!(c.process_next().await);
        assert_eq!(harness.take_log(), vec![format!("DELETE /routes/{}", gen_id("a_two.org"))]);
        assert!(c.last_manifest(&ObjectKey::new("default", "a")).is_none());
    }

    #[tokio::test]
    async fn test_update_without_newer_version_is_ignored() {
        let harness = Harness::start().await;
        let c = controller(&harness, 3).await;

        apply(&c, tls("a", "5", &["one.org"]));
        assert!(c.process_next().await);
        harness.take_log();

        apply(&c, tls("a", "5", &["two.org"]));
        assert!(c.queue().is_empty());

        // already processed version reaching a worker
        let old = Arc::new(tls("a", "4", &["one.org"]));
        c.queue().add(Event::update(ObjectKey::new("default", "a"), "apisix.apache.org/v2", old));
        assert!(c.process_next().await);
        assert!(harness.take_log().is_empty());
    }

    #[tokio::test]
    async fn test_events_for_missing_or_restored_objects_are_stale() {
        let harness = Harness::start().await;
        let c = controller(&harness, 3).await;

        c.queue().add(Event::add(ObjectKey::new("default", "gone"), "apisix.apache.org/v2"));
        assert!(c.process_next().await);

        apply(&c, tls("a", "1", &["one.org"]));
        assert!(c.process_next().await);
        harness.take_log();
        let tombstone = Arc::new(tls("a", "1", &["one.org"]));
        c.queue().add(Event::delete(ObjectKey::new("default", "a"), "apisix.apache.org/v2", tombstone));
        assert!(c.process_next().await);

        assert!(harness.take_log().is_empty());
        assert!(c.last_manifest(&ObjectKey::new("default", "a")).is_some());
    }

    #[tokio::test]
    async fn test_retryable_failure_is_requeued_then_given_up() {
        let harness = Harness::start().await;
        let c = controller(&harness, 1).await;
        let key = ObjectKey::new("default", "a");
        harness.fail_writes(true);

        apply(&c, tls("a", "1", &["one.org"]));
        assert!(c.process_next().await);
        assert_eq!(c.queue().num_requeues(&key), 1);

        let retried = tokio::time::timeout(Duration::from_secs(2), c.process_next()).await.unwrap();
        assert!(retried);
        assert_eq!(c.queue().num_requeues(&key), 0);
        assert!(c.last_manifest(&key).is_none());
        assert_eq!(harness.take_log().len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let harness = Harness::start().await;
        let c = controller(&harness, 3).await;

        apply(&c, tls("a", "1", &["invalid"]));
        assert!(c.process_next().await);
        assert!(c.queue().is_empty());
        assert_eq!(c.queue().num_requeues(&ObjectKey::new("default", "a")), 0);
        assert!(harness.take_log().is_empty());
    }

    #[tokio::test]
    async fn test_delete_falls_back_to_last_synced_manifest() {
        let harness = Harness::start().await;
        let c = controller(&harness, 3).await;

        apply(&c, tls("a", "1", &["one.org"]));
        assert!(c.process_next().await);
        harness.take_log();

        c.reconciler().store().remove(&ObjectKey::new("default", "a"));
        let tombstone = Arc::new(tls("a", "2", &["invalid"]));
        c.handle_notification(Notification::Deleted(tombstone));
        assert!(c.process_next().await);
        assert_eq!(harness.take_log(), vec![format!("DELETE /routes/{}", gen_id("a_one.org"))]);
    }

    #[tokio::test]
    async fn test_resync_and_dependents() {
        let harness = Harness::start().await;
        let c = controller(&harness, 3).await;
        c.reconciler().store().apply(tls("a", "1", &["one.org"]));
        c.reconciler().store().apply(tls("b", "1", &["two.org"]));

        assert_eq!(c.resync(), 2);
        assert_eq!(c.queue().len(), 2);
        assert_eq!(c.requeue_dependents(&Dependency::Service(ObjectKey::new("default", "httpbin"))), 0);
        assert_eq!(c.kind(), "HostRoutes");
    }

    #[tokio::test]
    async fn test_run_processes_until_cancelled() {
        let harness = Harness::start().await;
        let c = Arc::new(controller(&harness, 3).await);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(c.clone().run(rx, cancel.clone()));

        let notification = c.reconciler().store().apply(tls("a", "1", &["one.org"]));
        tx.send(notification).await.unwrap();
        c.reconciler().store().mark_synced();

        let statuses = c.reconciler().statuses.clone();
        tokio::time::timeout(Duration::from_secs(2), async {
            while statuses.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(c.queue().is_shutdown());
    }

    #[test]
    fn test_matches_class() {
        assert!(matches_class(None, "apisix"));
        assert!(matches_class(Some("apisix"), "apisix"));
        assert!(!matches_class(Some("nginx"), "apisix"));
    }
}
