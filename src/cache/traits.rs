//! Core traits and types for the local store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::search::SearchFields;

/// Trait for entities that can be stored locally.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Stable identifier for this entity
  fn cache_key(&self) -> &str;

  /// Local table holding this entity type (e.g., "parts")
  fn entity_type() -> &'static str;
}

/// Slow-changing catalog data, mirrored wholesale from the remote store.
pub trait ReferenceEntity: Cacheable {
  /// Remote table name
  fn remote_table() -> &'static str;

  /// Stable column used to order paginated fetches
  fn order_column() -> &'static str;

  /// Business key column, used for remote search
  fn key_column() -> &'static str;

  /// Fields considered by offline search
  fn search_fields(&self) -> SearchFields<'_>;
}

/// Result from a read, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the local copy was last written (if served locally)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the remote store.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Local data served because the remote call failed.
  pub fn stale(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::CacheStale,
      cached_at,
    }
  }

  /// Local data served because we are disconnected.
  pub fn offline(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Connected, but the remote call failed; serving the local copy
  CacheStale,
  /// Disconnected, serving the local copy
  Offline,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheSource::Network => f.write_str("network"),
      CacheSource::CacheStale => f.write_str("stale"),
      CacheSource::Offline => f.write_str("offline"),
    }
  }
}
