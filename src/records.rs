//! Offline-durable store for time records.
//!
//! Every write lands in the local store first and is then pushed to the
//! remote store if we are connected. A record whose push has not been
//! confirmed stays dirty (`synced_at` unset) until a sync cycle pushes it.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheResult, Cacheable, LocalStore};
use crate::error::{Result, SyncError};
use crate::models::TimeRecord;
use crate::network::NetworkMonitor;
use crate::remote::{Filter, PaginatedFetcher, RemoteBackend};

const ORDER_COLUMN: &str = "date";
const CONFLICT_KEY: &str = "id";

pub struct RecordStore<S: LocalStore> {
  store: Arc<S>,
  remote: Arc<dyn RemoteBackend>,
  fetcher: PaginatedFetcher,
  network: Arc<NetworkMonitor>,
}

impl<S: LocalStore> RecordStore<S> {
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

  fn table() -> &'static str {
    TimeRecord::entity_type()
  }

  /// Save a record locally, then try to push it.
  ///
  /// Disconnected: returns the dirty record, no error.
  /// Push failed: the local write stands, the record stays dirty and the
  /// error is returned so the caller can report it.
  pub async fn upsert(&self, mut record: TimeRecord) -> Result<TimeRecord> {
    record.validate()?;
    record.synced_at = None;
    self.store.put_record(&record)?;

    if !self.network.is_connected().await {
      debug!(id = %record.id, date = %record.date, "saved offline");
      return Ok(record);
    }

    self.push(&record).await.map_err(|e| {
      warn!(id = %record.id, error = %e, "push failed, record left dirty");
      e
    })
  }

  /// Push one record to the remote store and stamp it synced.
  ///
  /// If the local row was rewritten while the push was in flight, the newer
  /// content stays dirty and is pushed by a later cycle.
  pub async fn push(&self, record: &TimeRecord) -> Result<TimeRecord> {
    let row = serde_json::to_value(record).map_err(|source| SyncError::Serialization {
      action: "encode",
      table: Self::table().to_string(),
      source,
    })?;
    self.remote.upsert(Self::table(), vec![row], CONFLICT_KEY).await?;

    let now = Utc::now();
    let mut synced = record.clone();
    synced.synced_at = Some(now);
    if !self.store.mark_synced(record, now)? {
      debug!(id = %record.id, "record changed during push, still dirty");
      synced.synced_at = None;
    }
    Ok(synced)
  }

  /// All records of a user.
  ///
  /// Connected: the user's remote records replace the synced local ones;
  /// dirty local rows are kept since they hold edits the remote has not seen.
  pub async fn get_all(&self, user_id: &str) -> Result<CacheResult<Vec<TimeRecord>>> {
    if !self.network.is_connected().await {
      let records = self.store.records_for_user(user_id)?;
      return Ok(CacheResult::offline(records, None));
    }

    match self
      .fetcher
      .fetch_all_filtered::<TimeRecord>(Self::table(), ORDER_COLUMN, Filter::eq("user_id", user_id))
      .await
    {
      Ok(remote) => {
        let written = self
          .store
          .replace_user_records(user_id, &remote, Utc::now())?;
        debug!(user_id, fetched = remote.len(), written, "refreshed records");
        Ok(CacheResult::from_network(self.store.records_for_user(user_id)?))
      }
      Err(e) => {
        warn!(user_id, error = %e, "record refresh failed, serving local copy");
        let records = self.store.records_for_user(user_id)?;
        Ok(CacheResult::stale(records, None))
      }
    }
  }

  /// Local record for one day, if any.
  pub fn find_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeRecord>> {
    self.store.record_for_day(user_id, date)
  }

  /// Records not yet confirmed by the remote store.
  pub fn dirty_records(&self, user_id: &str) -> Result<Vec<TimeRecord>> {
    self.store.dirty_records(user_id)
  }

  /// Delete locally, then remotely if connected.
  ///
  /// Deletes made while disconnected never reach the remote store.
  pub async fn delete(&self, id: &str) -> Result<()> {
    self.store.remove_record(id)?;

    if !self.network.is_connected().await {
      warn!(id, "deleted offline, remote copy is not removed");
      return Ok(());
    }

    self.remote.delete(Self::table(), id).await
  }
}
