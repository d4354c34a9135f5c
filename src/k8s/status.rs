//! # Status Recording
//!
//! After each reconciliation the controller reports the outcome on the source
//! object's status subresource as a `ResourcesAvailable` condition.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::{Api, Client, Resource};
use serde_json::json;
use tracing::debug;

use crate::core::error::ControllerResult;
use crate::core::types::ObjectKey;
use crate::k8s::objects::SourceObject;

pub const CONDITION_TYPE: &str = "ResourcesAvailable";
pub const REASON_SYNCED: &str = "ResourcesSynced";
pub const REASON_SYNC_ABORTED: &str = "ResourceSyncAborted";
pub const MESSAGE_SYNCED: &str = "Sync Successfully";

const FIELD_MANAGER: &str = "apisix-ingress-controller";

/// The object whose status is written
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTarget {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub key: ObjectKey,
    pub generation: Option<i64>,
    /// The `ResourcesAvailable` condition the object currently reports
    pub current: Option<Condition>,
}

impl StatusTarget {
    /// Target for `object`, whose status currently holds `conditions`
    pub fn for_object<K>(object: &K, conditions: &[Condition]) -> Self
    where
        K: Resource<DynamicType = ()> + SourceObject,
    {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
            key: object.key(),
            generation: object.meta().generation,
            current: conditions.iter().find(|c| c.type_ == CONDITION_TYPE).cloned(),
        }
    }

    /// Whether the object already reports `outcome` for its generation
    ///
    /// Writing the same condition again would only produce another update
    /// notification for the object.
    pub fn reports(&self, outcome: &SyncOutcome) -> bool {
        let Some(current) = &self.current else {
            return false;
        };
        let wanted = outcome.condition(self.generation);
        current.status == wanted.status
            && current.reason == wanted.reason
            && current.message == wanted.message
            && current.observed_generation == wanted.observed_generation
    }
}

/// Result of a reconciliation as reported in status
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Synced,
    Aborted(String),
}

impl SyncOutcome {
    /// The condition describing this outcome
    pub fn condition(&self, generation: Option<i64>) -> Condition {
        let (status, reason, message) = match self {
            Self::Synced => ("True", REASON_SYNCED, MESSAGE_SYNCED.to_string()),
            Self::Aborted(message) => ("False", REASON_SYNC_ABORTED, message.clone()),
        };
        Condition {
            type_: CONDITION_TYPE.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message,
            observed_generation: generation,
            last_transition_time: Time(Utc::now()),
        }
    }
}

/// Sink for reconciliation outcomes
#[async_trait]
pub trait StatusRecorder: Send + Sync {
    async fn record(&self, target: &StatusTarget, outcome: &SyncOutcome) -> ControllerResult<()>;
}

/// Patches the status subresource through the API server
#[derive(Clone)]
pub struct KubeStatusRecorder {
    client: Client,
}

impl KubeStatusRecorder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusRecorder for KubeStatusRecorder {
    async fn record(&self, target: &StatusTarget, outcome: &SyncOutcome) -> ControllerResult<()> {
        let gvk = GroupVersionKind::gvk(&target.group, &target.version, &target.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, &target.plural);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &target.key.namespace, &resource);

        let patch = json!({
            "status": {
                "conditions": [outcome.condition(target.generation)]
            }
        });
        api.patch_status(&target.key.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;

        debug!(kind = %target.kind, key = %target.key, "Status updated");
        Ok(())
    }
}

/// Discards every outcome
#[derive(Debug, Clone, Default)]
pub struct NoopStatusRecorder;

#[async_trait]
impl StatusRecorder for NoopStatusRecorder {
    async fn record(&self, _target: &StatusTarget, _outcome: &SyncOutcome) -> ControllerResult<()> {
        Ok(())
    }
}
