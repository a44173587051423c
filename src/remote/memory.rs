//! In-memory remote backend for tests, with failure injection and counters.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{Filter, RemoteBackend, SelectQuery};
use crate::error::{RemoteOp, Result, SyncError};

pub struct MemoryBackend {
  tables: Mutex<HashMap<String, Vec<Value>>>,
  online: AtomicBool,
  fail_select_after: AtomicUsize,
  latency: Mutex<Duration>,
  selects: AtomicUsize,
  writes: AtomicUsize,
  upserts: AtomicUsize,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self {
      tables: Mutex::new(HashMap::new()),
      online: AtomicBool::new(true),
      fail_select_after: AtomicUsize::new(usize::MAX),
      latency: Mutex::new(Duration::ZERO),
      selects: AtomicUsize::new(0),
      writes: AtomicUsize::new(0),
      upserts: AtomicUsize::new(0),
    }
  }

  pub fn seed(&self, table: &str, rows: Vec<Value>) {
    self
      .tables
      .lock()
      .unwrap()
      .entry(table.to_string())
      .or_default()
      .extend(rows);
  }

  pub fn rows(&self, table: &str) -> Vec<Value> {
    self
      .tables
      .lock()
      .unwrap()
      .get(table)
      .cloned()
      .unwrap_or_default()
  }

  /// When false every request fails.
  pub fn set_reachable(&self, reachable: bool) {
    self.online.store(reachable, Ordering::SeqCst);
  }

  /// Let `n` selects succeed, then fail every following one.
  pub fn fail_select_after(&self, n: usize) {
    self.fail_select_after.store(n, Ordering::SeqCst);
  }

  pub fn set_latency(&self, latency: Duration) {
    *self.latency.lock().unwrap() = latency;
  }

  pub fn select_count(&self) -> usize {
    self.selects.load(Ordering::SeqCst)
  }

  /// Insert, update and delete attempts.
  pub fn write_count(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  pub fn upsert_count(&self) -> usize {
    self.upserts.load(Ordering::SeqCst)
  }

  async fn round_trip(&self, op: RemoteOp, table: &str) -> Result<()> {
    let latency = *self.latency.lock().unwrap();
    if !latency.is_zero() {
      tokio::time::sleep(latency).await;
    }
    if !self.online.load(Ordering::SeqCst) {
      return Err(SyncError::remote(op, table, "network unreachable"));
    }
    Ok(())
  }
}

fn column_text(row: &Value, column: &str) -> String {
  match row.get(column) {
    Some(Value::String(s)) => s.clone(),
    Some(Value::Null) | None => String::new(),
    Some(other) => other.to_string(),
  }
}

fn matches(row: &Value, filter: &Filter) -> bool {
  match filter {
    Filter::Eq { column, value } => column_text(row, column) == *value,
    Filter::Contains { column, value } => column_text(row, column)
      .to_lowercase()
      .contains(&value.to_lowercase()),
  }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
  async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Value>> {
    let attempt = self.selects.fetch_add(1, Ordering::SeqCst);
    self.round_trip(RemoteOp::Select, table).await?;
    if attempt >= self.fail_select_after.load(Ordering::SeqCst) {
      return Err(SyncError::remote(RemoteOp::Select, table, "injected failure"));
    }

    let mut rows: Vec<Value> = self
      .rows(table)
      .into_iter()
      .filter(|row| query.filter.as_ref().map_or(true, |f| matches(row, f)))
      .collect();

    if let Some(order) = &query.order {
      rows.sort_by_key(|row| column_text(row, &order.column));
      if !order.ascending {
        rows.reverse();
      }
    }

    if let Some(range) = query.range {
      rows = rows.into_iter().skip(range.offset).take(range.limit).collect();
    }

    Ok(rows)
  }

  async fn insert(&self, table: &str, row: Value) -> Result<Value> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.round_trip(RemoteOp::Insert, table).await?;
    self.seed(table, vec![row.clone()]);
    Ok(row)
  }

  async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.round_trip(RemoteOp::Update, table).await?;

    let mut tables = self.tables.lock().unwrap();
    let row = tables
      .get_mut(table)
      .and_then(|rows| rows.iter_mut().find(|r| column_text(r, "id") == id))
      .ok_or_else(|| SyncError::remote(RemoteOp::Update, table, format!("no row {}", id)))?;

    if let (Value::Object(target), Value::Object(fields)) = (&mut *row, patch) {
      target.extend(fields);
    }
    Ok(row.clone())
  }

  async fn delete(&self, table: &str, id: &str) -> Result<()> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.round_trip(RemoteOp::Delete, table).await?;
    if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
      rows.retain(|r| column_text(r, "id") != id);
    }
    Ok(())
  }

  async fn upsert(&self, table: &str, rows: Vec<Value>, conflict_key: &str) -> Result<()> {
    self.upserts.fetch_add(1, Ordering::SeqCst);
    self.round_trip(RemoteOp::Upsert, table).await?;

    let mut tables = self.tables.lock().unwrap();
    let existing = tables.entry(table.to_string()).or_default();
    for row in rows {
      let key = column_text(&row, conflict_key);
      match existing
        .iter_mut()
        .find(|r| column_text(r, conflict_key) == key)
      {
        Some(slot) => *slot = row,
        None => existing.push(row),
      }
    }
    Ok(())
  }
}
