//! Error types for the reconciler crate.

use std::fmt;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of object stored in the Resource Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Backing store of a ConfigServer.
    ConfigMap,
    /// Network endpoint of a ConfigServer.
    Service,
    /// Runtime deployment of a ConfigServer.
    Deployment,
    /// ConfigServer custom resource.
    ConfigServer,
    /// KeyValuePair custom resource.
    KeyValuePair,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConfigMap => "ConfigMap",
            Self::Service => "Service",
            Self::Deployment => "Deployment",
            Self::ConfigServer => "ConfigServer",
            Self::KeyValuePair => "KeyValuePair",
        };
        f.write_str(name)
    }
}

/// Reconciler error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Object is absent from the store.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: ObjectKind, name: String },
    /// Object already exists in the store.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: ObjectKind, name: String },
    /// Write precondition on the resource version failed.
    #[error("{kind} '{name}' was modified concurrently")]
    Conflict { kind: ObjectKind, name: String },
    /// Store or network failure worth retrying.
    #[error("transient failure: {reason}")]
    Transient { reason: String },
    /// Invalid input; retrying cannot help.
    #[error("permanent failure: {reason}")]
    Permanent { reason: String },
    /// Value could not be encoded or decoded.
    #[error("invalid data format: {reason}")]
    DataFormat { reason: String },
    /// A prerequisite is missing; the event is handled again once it appears.
    #[error("deferred: {reason}")]
    Deferred { reason: String },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Create a version conflict error.
    pub fn conflict(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    /// Create a transient error.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Create a permanent error.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
        }
    }

    /// Create a data format error.
    pub fn data_format(reason: impl Into<String>) -> Self {
        Self::DataFormat {
            reason: reason.into(),
        }
    }

    /// Create a deferred error.
    pub fn deferred(reason: impl Into<String>) -> Self {
        Self::Deferred {
            reason: reason.into(),
        }
    }

    /// Map a kube client error for an object, keeping the distinguished outcomes.
    pub fn from_kube(kind: ObjectKind, name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Self::not_found(kind, name),
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                Self::already_exists(kind, name)
            }
            kube::Error::Api(resp) if resp.code == 409 => Self::conflict(kind, name),
            kube::Error::Api(resp) if resp.code == 422 || resp.code == 400 => {
                Self::permanent(format!("{kind} '{name}' rejected: {}", resp.message))
            }
            other => Self::transient(format!("{kind} '{name}': {other}")),
        }
    }

    /// Whether the object was absent.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the object already existed.
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether a resource version precondition failed.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether handling waits for a prerequisite to appear.
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// Store outcomes that escape their handler count as transient: the
    /// next attempt observes a fresh state. Deferred work is not retried on
    /// a timer.
    pub const fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::Permanent { .. } | Self::DataFormat { .. } | Self::Deferred { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::data_format(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found(ObjectKind::ConfigMap, "svc-a-values");
        assert_eq!(err.to_string(), "ConfigMap 'svc-a-values' not found");
    }

    #[test]
    fn test_classification() {
        assert!(Error::transient("timeout").is_transient());
        assert!(Error::conflict(ObjectKind::ConfigMap, "x").is_transient());
        assert!(!Error::permanent("negative port").is_transient());
        assert!(!Error::data_format("bad json").is_transient());
        assert!(!Error::deferred("no backing store").is_transient());
        assert!(Error::deferred("no backing store").is_deferred());
    }

    #[test]
    fn test_from_kube_api_errors() {
        let api = |code: u16, reason: &str| {
            kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: "boom".to_string(),
                reason: reason.to_string(),
                code,
            })
        };

        assert!(Error::from_kube(ObjectKind::Service, "a", api(404, "NotFound")).is_not_found());
        assert!(
            Error::from_kube(ObjectKind::Service, "a", api(409, "AlreadyExists"))
                .is_already_exists()
        );
        assert!(Error::from_kube(ObjectKind::ConfigMap, "a", api(409, "Conflict")).is_conflict());
        assert!(!Error::from_kube(ObjectKind::Deployment, "a", api(422, "Invalid")).is_transient());
        assert!(Error::from_kube(ObjectKind::Deployment, "a", api(500, "InternalError")).is_transient());
    }
}
