//! # Error Handling Module
//!
//! This module defines every error the controller can produce, using the `thiserror`
//! crate. Errors are grouped by how the reconciliation loop must react to them:
//!
//! - **Terminal** errors (`Reference`, `MalformedSpec`) mean the source object itself
//!   cannot be translated. Retrying with the same input cannot succeed, so the event
//!   is forgotten and a failure condition is written to the object's status.
//! - **Stale** errors (`StaleEvent`) mean the queued event no longer matches the
//!   state of the resource store. They are dropped quietly.
//! - **Retryable** errors (`RemoteTransient`, `Kube`, `Io`) come from the outside
//!   world and are re-enqueued with backoff.
//!
//! `RemoteNotFound` is only ever produced by reads; a 404 on delete is reported
//! as success by the gateway client and never reaches this type.

use std::convert::Infallible;
use thiserror::Error;

/// Main result type used throughout the controller
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Comprehensive error types for the ingress controller
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControllerError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A source object references something that cannot be resolved
    /// (backend port, service, secret field)
    #[error("Reference error: {field} - {reason}")]
    Reference { field: String, reason: String },

    /// The source object is structurally invalid
    #[error("Malformed spec: {message}")]
    MalformedSpec { message: String },

    /// The queued event no longer reflects the state of the resource store
    #[error("Stale event: {message}")]
    StaleEvent { message: String },

    /// Network failure or non-success answer from the gateway admin API
    #[error("Gateway admin API error (status {status:?}): {message}")]
    RemoteTransient { status: Option<u16>, message: String },

    /// The requested entity does not exist in the gateway cache
    #[error("Entity not found: {kind}/{id}")]
    RemoteNotFound { kind: String, id: String },

    /// Kubernetes API errors (watch failures, status updates)
    #[error("Kubernetes API error: {message}")]
    Kube { message: String },

    /// I/O errors (file operations, sockets, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// Internal errors for unexpected failures
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ControllerError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a reference error for an unresolved field
    pub fn reference<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::Reference {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed spec error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedSpec {
            message: message.into(),
        }
    }

    /// Create a stale event error
    pub fn stale<S: Into<String>>(message: S) -> Self {
        Self::StaleEvent {
            message: message.into(),
        }
    }

    /// Create a remote error, optionally carrying the HTTP status
    pub fn remote<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Self::RemoteTransient {
            status,
            message: message.into(),
        }
    }

    /// Create a not found error for a cached gateway entity
    pub fn not_found<K: Into<String>, I: Into<String>>(kind: K, id: I) -> Self {
        Self::RemoteNotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error should be retried with backoff
    ///
    /// Everything that comes from the network or the API server is worth
    /// retrying; errors about the source object itself are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteTransient { .. }
                | Self::Kube { .. }
                | Self::Io { .. }
                | Self::Internal { .. }
        )
    }

    /// Check if this error is terminal for the current version of the object
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Reference { .. }
                | Self::MalformedSpec { .. }
                | Self::Configuration { .. }
                | Self::Json { .. }
                | Self::Yaml { .. }
        )
    }

    /// Check if this error only signals an outdated event
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleEvent { .. })
    }

    /// Get a string representation of the error type for logs and metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Reference { .. } => "reference_error",
            Self::MalformedSpec { .. } => "malformed_spec_error",
            Self::StaleEvent { .. } => "stale_event",
            Self::RemoteTransient { .. } => "remote_transient_error",
            Self::RemoteNotFound { .. } => "remote_not_found",
            Self::Kube { .. } => "kube_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<Infallible> for ControllerError {
    fn from(infallible: Infallible) -> Self {
        match infallible {}
    }
}

/// Implement conversion from std::io::Error
impl From<std::io::Error> for ControllerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_json::Error
impl From<serde_json::Error> for ControllerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_yaml::Error
impl From<serde_yaml::Error> for ControllerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from reqwest::Error
///
/// Transport failures never carry a response, so the status is only
/// filled in when reqwest saw one (e.g. `error_for_status`).
impl From<reqwest::Error> for ControllerError {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteTransient {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Implement conversion from kube::Error
impl From<kube::Error> for ControllerError {
    fn from(err: kube::Error) -> Self {
        Self::Kube {
            message: err.to_string(),
        }
    }
}

/// Convenience macro for creating internal errors
///
/// Usage: `internal_error!("queue closed while processing {}", key)`
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::core::error::ControllerError::internal(format!($($arg)*))
    };
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid worker count: {}", workers)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::ControllerError::config(format!($($arg)*))
    };
}
