//! Domain entities mirrored by the local store.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Reference from a part to a related part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRef {
  pub id: String,
  pub code: String,
}

/// Catalog part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
  pub id: String,
  pub code: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub name: Option<String>,
  /// Comma separated tag list
  #[serde(default)]
  pub tags: Option<String>,
  #[serde(default)]
  pub related_parts: Option<Vec<PartRef>>,
}

impl Part {
  pub fn tag_list(&self) -> Vec<&str> {
    self
      .tags
      .as_deref()
      .map(|t| {
        t.split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .collect()
      })
      .unwrap_or_default()
  }
}

/// Fleet tag (vehicle number)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetTag {
  pub id: String,
  pub number: String,
  #[serde(default)]
  pub description: Option<String>,
}

/// Whether a time record has been confirmed by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Dirty,
  Synced { at: DateTime<Utc> },
}

/// One user's time tracking for one calendar day.
///
/// A record carries either entry/exit times or a day status, never both.
/// `synced_at` lives in the local store's own column, not in the row
/// payload, so it is never sent to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
  pub id: String,
  pub user_id: String,
  pub date: NaiveDate,
  #[serde(default)]
  pub entry_time: Option<String>,
  #[serde(default)]
  pub exit_time: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(skip)]
  pub synced_at: Option<DateTime<Utc>>,
}

impl TimeRecord {
  pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      user_id: user_id.into(),
      date,
      entry_time: None,
      exit_time: None,
      status: None,
      created_at: Utc::now(),
      synced_at: None,
    }
  }

  /// Set entry/exit times, clearing any day status.
  pub fn set_times(&mut self, entry: Option<String>, exit: Option<String>) {
    self.entry_time = entry;
    self.exit_time = exit;
    self.status = None;
  }

  /// Set a day status, clearing entry/exit times.
  pub fn set_status(&mut self, status: impl Into<String>) {
    self.status = Some(status.into());
    self.entry_time = None;
    self.exit_time = None;
  }

  pub fn sync_state(&self) -> SyncState {
    match self.synced_at {
      Some(at) => SyncState::Synced { at },
      None => SyncState::Dirty,
    }
  }

  pub fn is_dirty(&self) -> bool {
    self.synced_at.is_none()
  }

  pub fn validate(&self) -> Result<()> {
    if self.id.is_empty() || self.user_id.is_empty() {
      return Err(SyncError::InvalidRecord(
        "id and user_id are required".to_string(),
      ));
    }
    if self.status.is_some() && (self.entry_time.is_some() || self.exit_time.is_some()) {
      return Err(SyncError::InvalidRecord(format!(
        "record {} has both a status and entry/exit times",
        self.id
      )));
    }
    for time in [&self.entry_time, &self.exit_time].into_iter().flatten() {
      if !is_clock_time(time) {
        return Err(SyncError::InvalidRecord(format!(
          "`{}` is not a HH:MM or HH:MM:SS time",
          time
        )));
      }
    }
    Ok(())
  }
}

/// Postgres `time` columns come back as HH:MM:SS, user input as HH:MM.
fn is_clock_time(value: &str) -> bool {
  ["%H:%M", "%H:%M:%S"]
    .iter()
    .any(|format| NaiveTime::parse_from_str(value, format).is_ok())
}
