//! Per-kind admin API operations on top of `ApisixClient`.

use reqwest::{Method, StatusCode};
use std::marker::PhantomData;
use tracing::{debug, warn};

use crate::apisix::cache::Cached;
use crate::apisix::cluster::{status_error, ApisixClient};
use crate::apisix::response::{parse_item, parse_list, Node};
use crate::core::error::{ControllerError, ControllerResult};

/// Typed view of one admin API collection (`/routes`, `/upstreams`, ...)
pub struct ResourceClient<'a, T> {
    cluster: &'a ApisixClient,
    _kind: PhantomData<T>,
}

impl<'a, T: Cached> ResourceClient<'a, T> {
    pub(crate) fn new(cluster: &'a ApisixClient) -> Self {
        Self {
            cluster,
            _kind: PhantomData,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.cluster.base_url(), T::KIND.plural())
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.cluster.base_url(), T::KIND.plural(), id)
    }

    fn lock_key(id: &str) -> String {
        format!("{}/{}", T::KIND.plural(), id)
    }

    fn decode(node: Node) -> ControllerResult<T> {
        let id = node.id().to_string();
        let mut entity: T = serde_json::from_value(node.value)?;
        if entity.id().is_empty() {
            entity.set_id(id);
        }
        Ok(entity)
    }

    /// Cached entity by id
    pub async fn get(&self, id: &str) -> ControllerResult<T> {
        self.cluster.wait_ready().await;
        self.cluster
            .cache()
            .get::<T>(id)
            .ok_or_else(|| ControllerError::not_found(T::KIND.as_str(), id))
    }

    /// Every cached entity of the kind
    pub async fn list(&self) -> ControllerResult<Vec<T>> {
        self.cluster.wait_ready().await;
        Ok(self.cluster.cache().list::<T>())
    }

    /// Create (or overwrite) an entity
    ///
    /// Entities with an id are written with `PUT /<plural>/<id>`; when the
    /// cache already holds an identical copy nothing is sent. Entities
    /// without an id are posted and receive the key the gateway assigns.
    pub async fn create(&self, entity: &T) -> ControllerResult<T> {
        if entity.id().is_empty() {
            return self.create_with_assigned_id(entity).await;
        }

        let id = entity.id().to_string();
        let _guard = self.cluster.locks().lock(&Self::lock_key(&id)).await;

        if self.cluster.cache().get::<T>(&id).as_ref() == Some(entity) {
            debug!(resource = T::KIND.as_str(), id = %id, "Entity unchanged, skipping create");
            return Ok(entity.clone());
        }

        self.put(entity).await
    }

    /// Overwrite an existing entity
    pub async fn update(&self, entity: &T) -> ControllerResult<T> {
        let id = entity.id();
        if id.is_empty() {
            return Err(ControllerError::internal(format!(
                "cannot update {} without id",
                T::KIND.as_str()
            )));
        }
        let _guard = self.cluster.locks().lock(&Self::lock_key(id)).await;
        self.put(entity).await
    }

    /// Delete an entity; a missing entity counts as deleted
    pub async fn delete(&self, entity: &T) -> ControllerResult<()> {
        let id = entity.id();
        if id.is_empty() {
            return Err(ControllerError::internal(format!(
                "cannot delete {} without id",
                T::KIND.as_str()
            )));
        }
        let _guard = self.cluster.locks().lock(&Self::lock_key(id)).await;

        let url = self.item_url(id);
        let (status, body) = self.cluster.send(T::KIND, Method::DELETE, &url, None).await?;
        if status == StatusCode::NOT_FOUND {
            debug!(resource = T::KIND.as_str(), id = id, "Entity already absent");
        } else if !status.is_success() {
            return Err(status_error(status, &body));
        }

        self.cluster.cache().remove::<T>(id);
        Ok(())
    }

    async fn put(&self, entity: &T) -> ControllerResult<T> {
        let url = self.item_url(entity.id());
        let payload = serde_json::to_value(entity)?;
        let (status, body) = self.cluster.send(T::KIND, Method::PUT, &url, Some(&payload)).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        self.cluster.cache().insert(entity.clone());
        Ok(entity.clone())
    }

    async fn create_with_assigned_id(&self, entity: &T) -> ControllerResult<T> {
        let url = self.collection_url();
        let payload = serde_json::to_value(entity)?;
        let (status, body) = self.cluster.send(T::KIND, Method::POST, &url, Some(&payload)).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let node = parse_item(&body)?;
        let id = node.id().to_string();
        if id.is_empty() {
            return Err(ControllerError::remote(
                Some(status.as_u16()),
                format!("admin api assigned no key to new {}", T::KIND.as_str()),
            ));
        }

        let mut created = entity.clone();
        created.set_id(id);
        self.cluster.cache().insert(created.clone());
        Ok(created)
    }

    /// List the collection from the admin API, bypassing the cache
    pub(crate) async fn fetch_all(&self) -> ControllerResult<Vec<T>> {
        let url = self.collection_url();
        let (status, body) = self.cluster.send(T::KIND, Method::GET, &url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let mut items = Vec::new();
        for node in parse_list(&body)? {
            let key = node.key.clone();
            match Self::decode(node) {
                Ok(entity) => items.push(entity),
                Err(err) => warn!(resource = T::KIND.as_str(), key = %key, error = %err, "Skipping undecodable entity"),
            }
        }
        Ok(items)
    }
}
