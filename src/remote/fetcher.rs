//! Whole-table fetches in fixed-size pages.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use super::{Filter, RemoteBackend, SelectQuery};
use crate::error::{Result, SyncError};

/// Rows requested per page.
pub const PAGE_SIZE: usize = 1000;

/// Fetches entire remote tables page by page.
///
/// The result is a best-effort snapshot: rows written remotely while the
/// pages are being read may or may not appear.
#[derive(Clone)]
pub struct PaginatedFetcher {
  backend: Arc<dyn RemoteBackend>,
  page_size: usize,
}

impl PaginatedFetcher {
  pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
    Self {
      backend,
      page_size: PAGE_SIZE,
    }
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  /// Fetch every row of `table`, ascending by `order_column`.
  pub async fn fetch_all<T: DeserializeOwned>(
    &self,
    table: &str,
    order_column: &str,
  ) -> Result<Vec<T>> {
    self.fetch_pages(table, order_column, None).await
  }

  /// Fetch every row of `table` matching `filter`, ascending by `order_column`.
  pub async fn fetch_all_filtered<T: DeserializeOwned>(
    &self,
    table: &str,
    order_column: &str,
    filter: Filter,
  ) -> Result<Vec<T>> {
    self.fetch_pages(table, order_column, Some(filter)).await
  }

  /// Any failing page aborts the whole fetch; nothing partial is returned.
  async fn fetch_pages<T: DeserializeOwned>(
    &self,
    table: &str,
    order_column: &str,
    filter: Option<Filter>,
  ) -> Result<Vec<T>> {
    let mut all_rows = Vec::new();
    let mut offset = 0usize;

    loop {
      let mut query = SelectQuery::new()
        .order_asc(order_column)
        .range(offset, self.page_size);
      query.filter = filter.clone();

      let page = self
        .backend
        .select(table, &query)
        .await
        .map_err(|e| SyncError::PartialFetchFailure {
          table: table.to_string(),
          offset,
          source: Box::new(e),
        })?;

      let page_len = page.len();
      for row in page {
        let entity = serde_json::from_value(row).map_err(|source| SyncError::Serialization {
          action: "decode",
          table: table.to_string(),
          source,
        })?;
        all_rows.push(entity);
      }

      debug!(table, offset, rows = page_len, "fetched page");

      // A short page is the last one
      if page_len < self.page_size {
        break;
      }
      offset += self.page_size;
    }

    Ok(all_rows)
  }
}
