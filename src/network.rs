//! Connectivity monitoring.
//!
//! `NetworkMonitor` answers "are we connected right now" within a bounded
//! time and publishes every transition on a watch channel. A failing or
//! slow probe degrades to the platform's own online flag; if that was never
//! reported, connectivity is unknown and counts as disconnected.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Primary connectivity check.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
  /// Ok(connected), or `ConnectivityUnavailable` if the check could not run.
  async fn probe(&self) -> Result<bool>;
}

/// Probes by sending a HEAD request; any HTTP response counts as connected.
pub struct HttpProbe {
  client: reqwest::Client,
  url: String,
}

impl HttpProbe {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      url: url.into(),
    }
  }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
  async fn probe(&self) -> Result<bool> {
    self
      .client
      .head(&self.url)
      .send()
      .await
      .map(|_| true)
      .map_err(|e| SyncError::ConnectivityUnavailable(e.to_string()))
  }
}

/// Connectivity reported by the host platform rather than measured.
#[derive(Default)]
pub struct ManualProbe {
  online: AtomicBool,
}

impl ManualProbe {
  pub fn new(online: bool) -> Self {
    Self {
      online: AtomicBool::new(online),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

#[async_trait]
impl ConnectivityProbe for ManualProbe {
  async fn probe(&self) -> Result<bool> {
    Ok(self.online.load(Ordering::SeqCst))
  }
}

pub struct NetworkMonitor {
  probe: Arc<dyn ConnectivityProbe>,
  timeout: Duration,
  /// Best-effort OS-level online flag, None until the platform reports one
  platform_online: Mutex<Option<bool>>,
  state: watch::Sender<bool>,
}

impl NetworkMonitor {
  pub fn new(probe: Arc<dyn ConnectivityProbe>, timeout: Duration) -> Self {
    let (state, _) = watch::channel(false);
    Self {
      probe,
      timeout,
      platform_online: Mutex::new(None),
      state,
    }
  }

  /// Check connectivity now. Never fails and never waits longer than the timeout.
  pub async fn is_connected(&self) -> bool {
    let connected = match tokio::time::timeout(self.timeout, self.probe.probe()).await {
      Ok(Ok(connected)) => connected,
      Ok(Err(e)) => {
        debug!(error = %e, "connectivity probe failed, using platform flag");
        self.platform_flag()
      }
      Err(_) => {
        debug!(timeout = ?self.timeout, "connectivity probe timed out, using platform flag");
        self.platform_flag()
      }
    };

    self.publish(connected);
    connected
  }

  /// Record the platform's own online flag, used when the probe is unavailable.
  pub fn set_platform_online(&self, online: bool) {
    if let Ok(mut flag) = self.platform_online.lock() {
      *flag = Some(online);
    }
  }

  fn platform_flag(&self) -> bool {
    self
      .platform_online
      .lock()
      .ok()
      .and_then(|flag| *flag)
      .unwrap_or(false)
  }

  fn publish(&self, connected: bool) {
    self.state.send_if_modified(|current| {
      if *current == connected {
        return false;
      }
      info!(connected, "connectivity changed");
      *current = connected;
      true
    });
  }

  /// Result of the most recent check, without probing.
  pub fn last_known(&self) -> bool {
    *self.state.borrow()
  }

  /// Stream of connectivity transitions.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.state.subscribe()
  }

  /// Invoke `callback` on every transition, in either direction.
  pub fn on_change<F>(&self, callback: F) -> JoinHandle<()>
  where
    F: Fn(bool) + Send + 'static,
  {
    let mut rx = self.subscribe();
    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let connected = *rx.borrow_and_update();
        callback(connected);
      }
    })
  }

  /// Re-check connectivity every `interval` until the task is aborted.
  pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
    let monitor = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;
        monitor.is_connected().await;
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::sync::mpsc;

  struct BrokenProbe;

  #[async_trait]
  impl ConnectivityProbe for BrokenProbe {
    async fn probe(&self) -> Result<bool> {
      Err(SyncError::ConnectivityUnavailable("no api".into()))
    }
  }

  struct HangingProbe;

  #[async_trait]
  impl ConnectivityProbe for HangingProbe {
    async fn probe(&self) -> Result<bool> {
      tokio::time::sleep(Duration::from_secs(3600)).await;
      Ok(true)
    }
  }

  fn monitor(probe: Arc<dyn ConnectivityProbe>) -> NetworkMonitor {
    NetworkMonitor::new(probe, Duration::from_millis(100))
  }

  #[tokio::test]
  async fn test_reports_probe_result() {
    let probe = Arc::new(ManualProbe::new(true));
    let monitor = monitor(probe.clone());
    assert!(monitor.is_connected().await);

    probe.set_online(false);
    assert!(!monitor.is_connected().await);
    assert!(!monitor.last_known());
  }

  #[tokio::test]
  async fn test_unavailable_probe_is_disconnected_without_platform_flag() {
    let monitor = monitor(Arc::new(BrokenProbe));
    assert!(!monitor.is_connected().await);
  }

  #[tokio::test]
  async fn test_unavailable_probe_falls_back_to_platform_flag() {
    let monitor = monitor(Arc::new(BrokenProbe));
    monitor.set_platform_online(true);
    assert!(monitor.is_connected().await);
  }

  #[tokio::test(start_paused = true)]
  async fn test_slow_probe_times_out() {
    let monitor = monitor(Arc::new(HangingProbe));
    assert!(!monitor.is_connected().await);

    monitor.set_platform_online(true);
    assert!(monitor.is_connected().await);
  }

  #[tokio::test]
  async fn test_subscribers_see_transitions_only() {
    let probe = Arc::new(ManualProbe::new(false));
    let monitor = monitor(probe.clone());
    let mut rx = monitor.subscribe();

    monitor.is_connected().await;
    assert!(!rx.has_changed().unwrap());

    probe.set_online(true);
    monitor.is_connected().await;
    assert!(rx.has_changed().unwrap());
    assert!(*rx.borrow_and_update());
  }

  #[tokio::test]
  async fn test_on_change_callback() {
    let probe = Arc::new(ManualProbe::new(false));
    let monitor = monitor(probe.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = monitor.on_change(move |connected| {
      let _ = tx.send(connected);
    });

    probe.set_online(true);
    monitor.is_connected().await;
    assert_eq!(rx.recv().await, Some(true));

    probe.set_online(false);
    monitor.is_connected().await;
    assert_eq!(rx.recv().await, Some(false));

    handle.abort();
  }

  #[tokio::test(start_paused = true)]
  async fn test_polling_publishes_changes() {
    let probe = Arc::new(ManualProbe::new(false));
    let monitor = Arc::new(monitor(probe.clone()));
    let mut rx = monitor.subscribe();
    let poller = monitor.spawn_polling(Duration::from_secs(5));

    probe.set_online(true);
    rx.changed().await.unwrap();
    assert!(*rx.borrow());

    poller.abort();
  }
}
