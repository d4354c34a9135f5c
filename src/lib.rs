//! # APISIX Ingress Controller Library
//!
//! Watches Kubernetes routing resources (Ingress, the `apisix.apache.org`
//! CRDs and Gateway API objects) and keeps an APISIX gateway configured to
//! match them through its admin API.
//!
//! ## Module Layout
//!
//! - `core`: errors, configuration and shared value types
//! - `identity`: deterministic names and ids of gateway entities
//! - `apisix`: typed admin API client with a write-through cache
//! - `k8s`: resource types, informer-backed stores, status recording
//! - `translation`: source objects to gateway manifests
//! - `manifest`: manifest diffing and ordered synchronization
//! - `queue`: deduplicating, rate limited work queues
//! - `controller`: per-kind event loops and the provider wiring them up
//! - `observability`: logging, Prometheus metrics and health probes

/// Errors, configuration and the object key / event types
pub mod core;

/// Entity naming and id generation
pub mod identity;

/// Gateway admin API client
pub mod apisix;

/// Kubernetes resources, stores and status
pub mod k8s;

/// Translation of source objects into manifests
pub mod translation;

/// Manifest diff and synchronization
pub mod manifest;

/// Work queues feeding the controllers
pub mod queue;

/// Controllers and their provider
pub mod controller;

/// Logging, metrics and health endpoints
pub mod observability;

pub use crate::core::config::ControllerConfig;
pub use crate::core::error::{ControllerError, ControllerResult};
pub use crate::core::types::{Event, EventType, ObjectKey};
pub use apisix::ApisixClient;
pub use controller::ControllerProvider;
pub use manifest::{Manifest, Synchronizer};
pub use translation::Translator;
