//! # Resource Store
//!
//! Local copies of watched objects, kept current by informers.
//!
//! An informer runs a `kube` watcher, mirrors every event into its
//! `LocalStore` and (optionally) forwards a `Notification` to the owning
//! controller over a bounded channel. Controllers never talk to the API
//! server for reads; they resolve the current object from the store when an
//! event is processed.

use dashmap::DashMap;
use futures::TryStreamExt;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::types::ObjectKey;
use crate::k8s::objects::SourceObject;

/// Change observed by an informer
#[derive(Debug, Clone)]
pub enum Notification<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(Arc<K>),
}

/// Thread-safe local copy of one kind of object
#[derive(Debug)]
pub struct LocalStore<K> {
    objects: DashMap<ObjectKey, Arc<K>>,
    synced: watch::Sender<bool>,
}

impl<K> Default for LocalStore<K> {
    fn default() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            objects: DashMap::new(),
            synced,
        }
    }
}

impl<K: SourceObject> LocalStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<Arc<K>> {
        self.objects.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        self.objects.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Store an object, returning the previous copy
    pub fn insert(&self, object: K) -> Option<Arc<K>> {
        self.objects.insert(object.key(), Arc::new(object))
    }

    pub fn remove(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.objects.remove(key).map(|(_, object)| object)
    }

    /// Whether the initial list completed
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    pub fn mark_synced(&self) {
        self.synced.send_replace(true);
    }

    /// Wait for the initial list to complete
    pub async fn wait_synced(&self) {
        let mut rx = self.synced.subscribe();
        let _ = rx.wait_for(|synced| *synced).await;
    }

    /// Apply an upsert and describe it as a notification
    pub fn apply(&self, object: K) -> Notification<K> {
        let new = Arc::new(object);
        match self.objects.insert(new.key(), new.clone()) {
            Some(old) => Notification::Updated { old, new },
            None => Notification::Added(new),
        }
    }

    /// Apply a deletion and describe it as a notification
    ///
    /// The final state reported by the watcher is kept as the tombstone.
    pub fn delete(&self, object: K) -> Notification<K> {
        self.objects.remove(&object.key());
        Notification::Deleted(Arc::new(object))
    }

    /// Replace the whole store after a (re)list
    pub fn replace(&self, objects: Vec<K>) -> Vec<Notification<K>> {
        let mut seen = HashSet::new();
        let mut notifications = Vec::with_capacity(objects.len());
        for object in objects {
            seen.insert(object.key());
            let unchanged = self
                .get(&object.key())
                .map(|current| current.resource_version_number() == object.resource_version_number())
                .unwrap_or(false);
            if unchanged {
                continue;
            }
            notifications.push(self.apply(object));
        }

        let gone: Vec<ObjectKey> = self.keys().into_iter().filter(|key| !seen.contains(key)).collect();
        for key in gone {
            if let Some(object) = self.remove(&key) {
                notifications.push(Notification::Deleted(object));
            }
        }
        notifications
    }
}

/// Watch `api` until cancelled, mirroring it into `store`
///
/// Objects are converted from the wire type `R` to the stored type `K`
/// (identity for single-version kinds, tagged enum for versioned ones).
/// Watch errors are retried with the watcher's default backoff.
pub async fn run_informer<R, K>(
    api: Api<R>,
    config: watcher::Config,
    store: Arc<LocalStore<K>>,
    notify: Option<mpsc::Sender<Notification<K>>>,
    cancel: CancellationToken,
) where
    R: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default,
    K: SourceObject + From<R>,
{
    let kind = R::kind(&R::DynamicType::default()).into_owned();
    info!(kind = %kind, "Starting informer");

    let stream = watcher::watcher(api, config).default_backoff();
    let mut stream = std::pin::pin!(stream);

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.try_next() => event,
        };

        let notifications = match event {
            Ok(Some(Event::Applied(object))) => vec![store.apply(K::from(object))],
            Ok(Some(Event::Deleted(object))) => vec![store.delete(K::from(object))],
            Ok(Some(Event::Restarted(objects))) => {
                let notifications = store.replace(objects.into_iter().map(K::from).collect());
                if !store.has_synced() {
                    info!(kind = %kind, objects = store.len(), "Informer synced");
                    store.mark_synced();
                }
                notifications
            }
            Ok(None) => {
                warn!(kind = %kind, "Watch stream ended");
                break;
            }
            Err(err) => {
                warn!(kind = %kind, error = %err, "Watch error, retrying");
                continue;
            }
        };

        if let Some(tx) = &notify {
            for notification in notifications {
                if tx.send(notification).await.is_err() {
                    debug!(kind = %kind, "Notification receiver closed");
                    return;
                }
            }
        }
    }

    info!(kind = %kind, "Informer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::crd::{ApisixTls, ApisixTlsSpec};

    fn tls(name: &str, rv: &str) -> ApisixTls {
        let mut object = ApisixTls::new(name, ApisixTlsSpec::default());
        object.metadata.namespace = Some("default".to_string());
        object.metadata.resource_version = Some(rv.to_string());
        object
    }

    #[test]
    fn test_apply_reports_added_then_updated() {
        let store = LocalStore::new();
        assert!(matches!(store.apply(tls("a", "1")), Notification::Added(_)));
        match store.apply(tls("a", "2")) {
            Notification::Updated { old, new } => {
                assert_eq!(old.resource_version_number(), 1);
                assert_eq!(new.resource_version_number(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_emits_only_changes() {
        let store = LocalStore::new();
        store.apply(tls("a", "1"));
        store.apply(tls("b", "1"));

        let notifications = store.replace(vec![tls("a", "1"), tls("c", "5")]);
        assert_eq!(notifications.len(), 2);
        assert!(notifications.iter().any(|n| matches!(n, Notification::Added(o) if o.key().name == "c")));
        assert!(notifications.iter().any(|n| matches!(n, Notification::Deleted(o) if o.key().name == "b")));
        assert!(store.get(&ObjectKey::new("default", "b")).is_none());
    }

    #[tokio::test]
    async fn test_wait_synced() {
        let store = Arc::new(LocalStore::<ApisixTls>::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_synced().await })
        };
        store.mark_synced();
        waiter.await.unwrap();
        assert!(store.has_synced());
    }
}
