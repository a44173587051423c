//! Sync scheduler.
//!
//! Reconciliation cycles are requested by independent triggers (app
//! lifecycle, reconnection, a fixed timer, explicit requests). A single
//! in-flight flag makes sure at most one cycle runs at a time; a request
//! arriving while a cycle runs is dropped, not queued.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::LocalStore;
use crate::event::{LifecycleEvent, LifecycleEvents};
use crate::network::NetworkMonitor;
use crate::records::RecordStore;

/// What asked for a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
  /// App came to the foreground
  Lifecycle,
  /// Network went from disconnected to connected
  Connectivity,
  /// Fixed interval while a session is active
  Timer,
  /// Last chance before the app is suspended
  Background,
  /// Explicit request from the user
  Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// Another cycle is running
  InFlight,
  /// No user session is active
  NoSession,
  Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  Skipped(SkipReason),
  Completed(CycleReport),
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
  /// Records confirmed by the remote store
  pub pushed: usize,
  /// Dirty records left after the cycle
  pub remaining: usize,
  /// Error that stopped the cycle early
  pub error: Option<String>,
}

/// Snapshot of scheduler state for display.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
  pub cycles: u64,
  pub last_cycle_at: Option<DateTime<Utc>>,
  pub last_trigger: Option<SyncTrigger>,
  pub pending: usize,
  pub last_error: Option<String>,
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct SyncScheduler<S: LocalStore> {
  records: Arc<RecordStore<S>>,
  network: Arc<NetworkMonitor>,
  interval: Duration,
  in_flight: AtomicBool,
  session: Mutex<Option<String>>,
  status: Mutex<SyncStatus>,
}

impl<S: LocalStore + 'static> SyncScheduler<S> {
  pub fn new(records: Arc<RecordStore<S>>, network: Arc<NetworkMonitor>, interval: Duration) -> Self {
    Self {
      records,
      network,
      interval,
      in_flight: AtomicBool::new(false),
      session: Mutex::new(None),
      status: Mutex::new(SyncStatus::default()),
    }
  }

  pub fn begin_session(&self, user_id: impl Into<String>) {
    if let Ok(mut session) = self.session.lock() {
      *session = Some(user_id.into());
    }
  }

  pub fn end_session(&self) {
    if let Ok(mut session) = self.session.lock() {
      *session = None;
    }
  }

  pub fn active_user(&self) -> Option<String> {
    self.session.lock().ok().and_then(|s| s.clone())
  }

  pub fn is_syncing(&self) -> bool {
    self.in_flight.load(Ordering::Acquire)
  }

  pub fn status(&self) -> SyncStatus {
    self
      .status
      .lock()
      .map(|s| s.clone())
      .unwrap_or_default()
  }

  /// Run one cycle unless one is already running.
  pub async fn request_sync(&self, trigger: SyncTrigger) -> SyncOutcome {
    let Some(user_id) = self.active_user() else {
      return SyncOutcome::Skipped(SkipReason::NoSession);
    };

    if self
      .in_flight
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      debug!(?trigger, "sync already in flight, request dropped");
      return SyncOutcome::Skipped(SkipReason::InFlight);
    }
    let _guard = InFlightGuard(&self.in_flight);

    if !self.network.is_connected().await {
      debug!(?trigger, "offline, sync skipped");
      return SyncOutcome::Skipped(SkipReason::Offline);
    }

    let report = self.run_cycle(&user_id).await;
    info!(
      ?trigger,
      pushed = report.pushed,
      remaining = report.remaining,
      "sync cycle finished"
    );
    self.record_status(trigger, &report);

    SyncOutcome::Completed(report)
  }

  /// Run one cycle before the process is suspended.
  pub async fn run_before_suspend(&self) -> SyncOutcome {
    self.request_sync(SyncTrigger::Background).await
  }

  /// Push dirty records oldest first, stopping at the first failure.
  async fn run_cycle(&self, user_id: &str) -> CycleReport {
    let mut report = CycleReport::default();

    let dirty = match self.records.dirty_records(user_id) {
      Ok(dirty) => dirty,
      Err(e) => {
        warn!(error = %e, "could not read dirty records");
        report.error = Some(e.to_string());
        return report;
      }
    };

    for record in &dirty {
      match self.records.push(record).await {
        Ok(pushed) if !pushed.is_dirty() => report.pushed += 1,
        Ok(_) => {}
        Err(e) => {
          warn!(id = %record.id, error = %e, "push failed, stopping cycle");
          report.error = Some(e.to_string());
          break;
        }
      }
    }

    report.remaining = match self.records.dirty_records(user_id) {
      Ok(left) => left.len(),
      Err(e) => {
        warn!(error = %e, "could not recount dirty records");
        dirty.len() - report.pushed
      }
    };
    report
  }

  fn record_status(&self, trigger: SyncTrigger, report: &CycleReport) {
    if let Ok(mut status) = self.status.lock() {
      status.cycles += 1;
      status.last_cycle_at = Some(Utc::now());
      status.last_trigger = Some(trigger);
      status.pending = report.remaining;
      status.last_error = report.error.clone();
    }
  }

  /// Request a cycle on its own task.
  pub fn spawn_request(self: &Arc<Self>, trigger: SyncTrigger) -> JoinHandle<SyncOutcome> {
    let scheduler = Arc::clone(self);
    tokio::spawn(async move { scheduler.request_sync(trigger).await })
  }

  /// Start listening to every trigger source.
  ///
  /// Each trigger is handled on its own task, so the in-flight flag is what
  /// keeps cycles from overlapping.
  pub fn start(self: &Arc<Self>, mut lifecycle: LifecycleEvents) -> SchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let scheduler = Arc::clone(self);
    let mut network_rx = self.network.subscribe();
    let mut was_connected = *network_rx.borrow_and_update();
    let mut lifecycle_open = true;

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(scheduler.interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // The first tick completes immediately
      ticker.tick().await;

      loop {
        tokio::select! {
          _ = ticker.tick() => {
            if scheduler.active_user().is_some() {
              scheduler.spawn_request(SyncTrigger::Timer);
            }
          }
          changed = network_rx.changed() => {
            if changed.is_err() {
              break;
            }
            let connected = *network_rx.borrow_and_update();
            if connected && !was_connected {
              scheduler.spawn_request(SyncTrigger::Connectivity);
            }
            was_connected = connected;
          }
          event = lifecycle.next(), if lifecycle_open => match event {
            Some(LifecycleEvent::Foreground) => {
              scheduler.spawn_request(SyncTrigger::Lifecycle);
            }
            Some(LifecycleEvent::Background) => {
              scheduler.spawn_request(SyncTrigger::Background);
            }
            None => {
              // Platform stopped reporting; timer and connectivity still apply
              debug!("lifecycle source closed");
              lifecycle_open = false;
            }
          },
          _ = shutdown_rx.changed() => break,
        }
      }

      debug!("sync scheduler stopped");
    });

    SchedulerHandle {
      shutdown: shutdown_tx,
      task,
    }
  }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
  shutdown: watch::Sender<bool>,
  task: JoinHandle<()>,
}

impl SchedulerHandle {
  /// Stop listening to triggers. A cycle already running finishes on its own task.
  pub async fn shutdown(self) {
    let _ = self.shutdown.send(true);
    let _ = self.task.await;
  }
}
