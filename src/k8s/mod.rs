//! # Kubernetes Integration
//!
//! Everything the controller reads from or writes to the API server:
//! resource types, informer-backed stores, lookup directories and status
//! recording.

pub mod crd;
pub mod directory;
pub mod objects;
pub mod status;
pub mod store;

pub use directory::{
    BackendPort, Endpoint, KubeSecretDirectory, KubeServiceDirectory, KubeUpstreamDirectory, SecretDirectory,
    ServiceDirectory, UpstreamDirectory,
};
pub use objects::{ApisixConsumerObject, ApisixRouteObject, IngressObject, SourceObject};
pub use status::{KubeStatusRecorder, NoopStatusRecorder, StatusRecorder, StatusTarget, SyncOutcome};
pub use store::{run_informer, LocalStore, Notification};
