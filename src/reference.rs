//! Reference data cache for parts and fleet tags.
//!
//! Reads prefer the remote store when connected and mirror it wholesale
//! into the local store (full refresh, not a diff). Writes are strict-online:
//! the remote store must accept them before the local copy changes.
//!
//! A refresh is not linearizable with remote writes made while its pages
//! are being read. That is acceptable for slow-changing catalog data.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheResult, LocalStore, ReferenceEntity};
use crate::error::{RemoteOp, Result, SyncError};
use crate::network::NetworkMonitor;
use crate::remote::{Filter, PaginatedFetcher, RemoteBackend};
use crate::search;

pub struct ReferenceCache<S: LocalStore> {
  store: Arc<S>,
  remote: Arc<dyn RemoteBackend>,
  fetcher: PaginatedFetcher,
  network: Arc<NetworkMonitor>,
}

impl<S: LocalStore> ReferenceCache<S> {
  pub fn new(
    store: Arc<S>,
    remote: Arc<dyn RemoteBackend>,
    fetcher: PaginatedFetcher,
    network: Arc<NetworkMonitor>,
  ) -> Self {
    Self {
      store,
      remote,
      fetcher,
      network,
    }
  }

  /// Get the whole table.
  ///
  /// 1. Disconnected: serve the local copy
  /// 2. Connected: fetch every page, replace the local table, return the fetched set
  /// 3. Fetch failed: serve the local copy as stale
  pub async fn get_all<T: ReferenceEntity>(&self) -> Result<CacheResult<Vec<T>>> {
    if !self.network.is_connected().await {
      let local = self.store.load_all::<T>()?;
      debug!(table = T::entity_type(), rows = local.entities.len(), "offline read");
      return Ok(CacheResult::offline(local.entities, local.cached_at));
    }

    match self
      .fetcher
      .fetch_all::<T>(T::remote_table(), T::order_column())
      .await
    {
      Ok(fetched) => {
        // Only a complete fetch reaches this point
        self.store.replace_all(&fetched)?;
        info!(table = T::entity_type(), rows = fetched.len(), "refreshed local mirror");
        Ok(CacheResult::from_network(fetched))
      }
      Err(e) => {
        warn!(table = T::entity_type(), error = %e, "refresh failed, serving local copy");
        let local = self.store.load_all::<T>()?;
        Ok(CacheResult::stale(local.entities, local.cached_at))
      }
    }
  }

  /// Search by business key remotely, or rank the local copy when offline.
  pub async fn search<T: ReferenceEntity>(&self, query: &str) -> Result<CacheResult<Vec<T>>> {
    if !self.network.is_connected().await {
      let local = self.store.load_all::<T>()?;
      let ranked = search::rank(local.entities, query, T::search_fields);
      return Ok(CacheResult::offline(ranked, local.cached_at));
    }

    let filter = Filter::contains(T::key_column(), query.trim());
    match self
      .fetcher
      .fetch_all_filtered::<T>(T::remote_table(), T::order_column(), filter)
      .await
    {
      Ok(found) => Ok(CacheResult::from_network(found)),
      Err(e) => {
        warn!(table = T::entity_type(), error = %e, "remote search failed, searching local copy");
        let local = self.store.load_all::<T>()?;
        let ranked = search::rank(local.entities, query, T::search_fields);
        Ok(CacheResult::stale(ranked, local.cached_at))
      }
    }
  }

  /// Create an entity remotely, then mirror the stored row locally.
  pub async fn add<T: ReferenceEntity>(&self, entity: &T) -> Result<T> {
    self.require_online::<T>(RemoteOp::Insert).await?;

    let row = self.remote.insert(T::remote_table(), encode(entity)?).await?;
    let stored = decode::<T>(row)?;
    self.store.put(&stored)?;

    debug!(table = T::entity_type(), id = stored.cache_key(), "added");
    Ok(stored)
  }

  /// Update an entity remotely, then mirror the stored row locally.
  pub async fn update<T: ReferenceEntity>(&self, entity: &T) -> Result<T> {
    self.require_online::<T>(RemoteOp::Update).await?;

    let row = self
      .remote
      .update(T::remote_table(), entity.cache_key(), encode(entity)?)
      .await?;
    let stored = decode::<T>(row)?;
    self.store.put(&stored)?;

    debug!(table = T::entity_type(), id = stored.cache_key(), "updated");
    Ok(stored)
  }

  /// Delete an entity remotely, then drop the local copy.
  pub async fn delete<T: ReferenceEntity>(&self, id: &str) -> Result<()> {
    self.require_online::<T>(RemoteOp::Delete).await?;

    self.remote.delete(T::remote_table(), id).await?;
    self.store.remove::<T>(id)?;

    debug!(table = T::entity_type(), id, "deleted");
    Ok(())
  }

  async fn require_online<T: ReferenceEntity>(&self, op: RemoteOp) -> Result<()> {
    if self.network.is_connected().await {
      Ok(())
    } else {
      Err(SyncError::remote(op, T::remote_table(), "not connected"))
    }
  }
}

fn encode<T: ReferenceEntity>(entity: &T) -> Result<Value> {
  serde_json::to_value(entity).map_err(|source| SyncError::Serialization {
    action: "encode",
    table: T::remote_table().to_string(),
    source,
  })
}

fn decode<T: ReferenceEntity>(row: Value) -> Result<T> {
  serde_json::from_value(row).map_err(|source| SyncError::Serialization {
    action: "decode",
    table: T::remote_table().to_string(),
    source,
  })
}
