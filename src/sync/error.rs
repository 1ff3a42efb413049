use thiserror::Error;

use crate::storage::LocalStoreError;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("remote channel closed")]
    Closed,
}

impl RemoteError {
    /// Connectivity problems that clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Closed)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Parse(e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("reading entries of {from} failed: {source}")]
    Read {
        from: String,
        #[source]
        source: RemoteError,
    },

    #[error("copying {count} entries from {from} to {to} failed: {source}")]
    Copy {
        from: String,
        to: String,
        count: usize,
        #[source]
        source: RemoteError,
    },
}

/// Errors reported to callers of the engine. Each carries the operation and entry id.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{op} {id}: entry is not in the current view")]
    NotFound { op: &'static str, id: String },

    #[error("{op} {id}: local store failed: {source}")]
    Local {
        op: &'static str,
        id: String,
        #[source]
        source: LocalStoreError,
    },

    #[error("{op} {id}: remote store failed: {source}")]
    Remote {
        op: &'static str,
        id: String,
        #[source]
        source: RemoteError,
    },

    #[error("{op} {id}: active identity changed before completion")]
    IdentityChanged { op: &'static str, id: String },

    #[error("update {id}: patch changes nothing")]
    InvalidPatch { id: String },

    #[error("{op}: no active identity")]
    NoIdentity { op: &'static str },

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("sync engine stopped")]
    EngineStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Network("refused".into()).is_transient());
        assert!(RemoteError::Closed.is_transient());
        assert!(!RemoteError::Unauthorized("expired".into()).is_transient());
        assert!(!RemoteError::Status {
            code: 500,
            message: "boom".into()
        }
        .is_transient());
    }

    #[test]
    fn test_errors_name_operation_and_entry() {
        let err = SyncError::Remote {
            op: "update",
            id: "r1".into(),
            source: RemoteError::Status {
                code: 404,
                message: "gone".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "update r1: remote store failed: server returned 404: gone"
        );
    }
}
