//! Error taxonomy for the sync core.

use std::fmt;

/// Remote operation kinds, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
  Select,
  Insert,
  Update,
  Delete,
  Upsert,
}

impl fmt::Display for RemoteOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RemoteOp::Select => "select",
      RemoteOp::Insert => "insert",
      RemoteOp::Update => "update",
      RemoteOp::Delete => "delete",
      RemoteOp::Upsert => "upsert",
    };
    f.write_str(name)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  /// The connectivity check itself could not run. Callers treat this as
  /// disconnected; it is never surfaced to the UI.
  #[error("connectivity check unavailable: {0}")]
  ConnectivityUnavailable(String),

  /// The backend rejected a request, or the request never reached it.
  #[error("remote {operation} on `{table}` failed: {message}")]
  RemoteOperationFailed {
    operation: RemoteOp,
    table: String,
    message: String,
  },

  /// The embedded database errored. Always fatal to the current operation.
  #[error("local store failure: {0}")]
  LocalStoreFailure(String),

  /// One page of a paginated fetch failed; nothing from the fetch is kept.
  #[error("fetch of `{table}` aborted at offset {offset}: {source}")]
  PartialFetchFailure {
    table: String,
    offset: usize,
    #[source]
    source: Box<SyncError>,
  },

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("invalid record: {0}")]
  InvalidRecord(String),

  #[error("failed to {action} `{table}` row: {source}")]
  Serialization {
    action: &'static str,
    table: String,
    #[source]
    source: serde_json::Error,
  },
}

impl SyncError {
  pub fn remote(operation: RemoteOp, table: &str, message: impl fmt::Display) -> Self {
    SyncError::RemoteOperationFailed {
      operation,
      table: table.to_string(),
      message: message.to_string(),
    }
  }

  pub fn store(context: &str, err: impl fmt::Display) -> Self {
    SyncError::LocalStoreFailure(format!("{}: {}", context, err))
  }

  pub fn is_remote(&self) -> bool {
    matches!(
      self,
      SyncError::RemoteOperationFailed { .. } | SyncError::PartialFetchFailure { .. }
    )
  }
}

impl From<rusqlite::Error> for SyncError {
  fn from(err: rusqlite::Error) -> Self {
    SyncError::LocalStoreFailure(err.to_string())
  }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_remote_error_message() {
    let err = SyncError::remote(RemoteOp::Insert, "parts", "offline");
    assert_eq!(err.to_string(), "remote insert on `parts` failed: offline");
    assert!(err.is_remote());
  }

  #[test]
  fn test_partial_fetch_keeps_cause() {
    let err = SyncError::PartialFetchFailure {
      table: "parts".into(),
      offset: 2000,
      source: Box::new(SyncError::remote(RemoteOp::Select, "parts", "timeout")),
    };
    assert!(err.to_string().contains("offset 2000"));
    assert!(std::error::Error::source(&err).is_some());
  }

  #[test]
  fn test_sqlite_errors_are_local_failures() {
    let err: SyncError = rusqlite::Error::InvalidQuery.into();
    assert!(matches!(err, SyncError::LocalStoreFailure(_)));
    assert!(!err.is_remote());
  }
}
