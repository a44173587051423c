//! Boundary with the remote backend.
//!
//! The backend is an opaque request/response service; every call is a
//! network request and any failure surfaces as `RemoteOperationFailed`.

mod fetcher;
#[cfg(test)]
pub mod memory;
mod rest;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use fetcher::{PaginatedFetcher, PAGE_SIZE};
pub use rest::RestBackend;

/// Row filter for select queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  /// Column equals value
  Eq { column: String, value: String },
  /// Case-insensitive substring match
  Contains { column: String, value: String },
}

impl Filter {
  pub fn eq(column: &str, value: &str) -> Self {
    Filter::Eq {
      column: column.to_string(),
      value: value.to_string(),
    }
  }

  pub fn contains(column: &str, value: &str) -> Self {
    Filter::Contains {
      column: column.to_string(),
      value: value.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
  pub column: String,
  pub ascending: bool,
}

/// Window of rows, `offset` is zero based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
  pub offset: usize,
  pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
  pub filter: Option<Filter>,
  pub order: Option<Order>,
  pub range: Option<Range>,
}

impl SelectQuery {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filter = Some(filter);
    self
  }

  pub fn order_asc(mut self, column: &str) -> Self {
    self.order = Some(Order {
      column: column.to_string(),
      ascending: true,
    });
    self
  }

  pub fn range(mut self, offset: usize, limit: usize) -> Self {
    self.range = Some(Range { offset, limit });
    self
  }
}

/// Request/response interface of the remote store.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
  async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Value>>;

  /// Insert a row, returning the row as stored.
  async fn insert(&self, table: &str, row: Value) -> Result<Value>;

  /// Patch the row with `id`, returning the row as stored.
  async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value>;

  async fn delete(&self, table: &str, id: &str) -> Result<()>;

  /// Insert or merge rows keyed by `conflict_key`.
  async fn upsert(&self, table: &str, rows: Vec<Value>, conflict_key: &str) -> Result<()>;
}
