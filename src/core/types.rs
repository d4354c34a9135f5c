//! # Core Types
//!
//! Small value types shared by the resource store, the work queue and the
//! controllers: the `namespace/name` object key and the reconciliation event.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::error::{ControllerError, ControllerResult};

/// Namespaced identity of a source object (`namespace/name`)
///
/// Cluster-scoped objects have an empty namespace and render as just `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new<N: Into<String>, M: Into<String>>(namespace: N, name: M) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `namespace/name` (or bare `name`) key
    pub fn parse(key: &str) -> ControllerResult<Self> {
        let parts: Vec<&str> = key.split('/').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self::new("", *name)),
            [namespace, name] if !name.is_empty() => Ok(Self::new(*namespace, *name)),
            _ => Err(ControllerError::malformed(format!("invalid resource key: {}", key))),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Kind of change reported by the resource store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Add,
    Update,
    Delete,
}

impl EventType {
    /// Lower-case operation label used in metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work for a controller
///
/// Events are compact: the current object is always re-read from the store
/// when the event is processed. Only the previous object of an update and the
/// final state of a deleted object travel with the event.
#[derive(Debug)]
pub struct Event<T> {
    pub event_type: EventType,
    pub key: ObjectKey,
    pub group_version: String,
    pub old_object: Option<Arc<T>>,
    pub tombstone: Option<Arc<T>>,
}

// Manual impl: deriving would require `T: Clone` although only `Arc<T>` is cloned.
impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type,
            key: self.key.clone(),
            group_version: self.group_version.clone(),
            old_object: self.old_object.clone(),
            tombstone: self.tombstone.clone(),
        }
    }
}

impl<T> Event<T> {
    pub fn add(key: ObjectKey, group_version: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Add,
            key,
            group_version: group_version.into(),
            old_object: None,
            tombstone: None,
        }
    }

    pub fn update(key: ObjectKey, group_version: impl Into<String>, old_object: Arc<T>) -> Self {
        Self {
            event_type: EventType::Update,
            key,
            group_version: group_version.into(),
            old_object: Some(old_object),
            tombstone: None,
        }
    }

    pub fn delete(key: ObjectKey, group_version: impl Into<String>, tombstone: Arc<T>) -> Self {
        Self {
            event_type: EventType::Delete,
            key,
            group_version: group_version.into(),
            old_object: None,
            tombstone: Some(tombstone),
        }
    }
}
