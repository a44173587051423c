//! Wiring of the sync core.
//!
//! Every component gets the store, remote backend and network monitor
//! injected here; nothing is held in global state.

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::SqliteStorage;
use crate::config::Config;
use crate::event::LifecycleEvents;
use crate::network::{ConnectivityProbe, HttpProbe, ManualProbe, NetworkMonitor};
use crate::records::RecordStore;
use crate::reference::ReferenceCache;
use crate::remote::{PaginatedFetcher, RemoteBackend, RestBackend};
use crate::sync::{SyncOutcome, SyncScheduler};

/// Main application state
pub struct App {
  /// Parts and fleet tags
  pub reference: ReferenceCache<SqliteStorage>,

  /// Time records
  pub records: Arc<RecordStore<SqliteStorage>>,

  /// Sync cycle coordination
  pub scheduler: Arc<SyncScheduler<SqliteStorage>>,

  pub network: Arc<NetworkMonitor>,

  poll_interval: Duration,
}

impl App {
  /// Open the local store and connect to the configured backend.
  ///
  /// With `offline` the network is reported as unavailable and nothing is
  /// sent to the remote store.
  pub fn new(config: &Config, offline: bool) -> Result<Self> {
    let path = match &config.database_path {
      Some(path) => path.clone(),
      None => SqliteStorage::default_path()?,
    };
    let store = Arc::new(SqliteStorage::open(&path)?);
    info!(path = %path.display(), "opened local store");

    let probe: Arc<dyn ConnectivityProbe> = if offline {
      Arc::new(ManualProbe::new(false))
    } else {
      Arc::new(HttpProbe::new(config.probe_url()))
    };
    let api_key = if offline {
      Config::get_api_key().unwrap_or_default()
    } else {
      Config::get_api_key()?
    };
    let remote = Arc::new(RestBackend::new(&config.remote, api_key)?);

    Ok(Self::assemble(config, store, remote, probe))
  }

  /// Build the components around already constructed collaborators.
  pub fn assemble(
    config: &Config,
    store: Arc<SqliteStorage>,
    remote: Arc<dyn RemoteBackend>,
    probe: Arc<dyn ConnectivityProbe>,
  ) -> Self {
    let network = Arc::new(NetworkMonitor::new(probe, config.network.probe_timeout()));
    let fetcher = PaginatedFetcher::new(remote.clone()).with_page_size(config.sync.page_size);

    let reference = ReferenceCache::new(
      store.clone(),
      remote.clone(),
      fetcher.clone(),
      network.clone(),
    );
    let records = Arc::new(RecordStore::new(store, remote, fetcher, network.clone()));
    let scheduler = Arc::new(SyncScheduler::new(
      records.clone(),
      network.clone(),
      config.sync.interval(),
    ));

    Self {
      reference,
      records,
      scheduler,
      network,
      poll_interval: config.network.poll_interval(),
    }
  }

  /// Keep `user_id`'s records in sync until Ctrl-C, then run a final cycle.
  pub async fn watch(&self, user_id: &str) -> Result<()> {
    self.scheduler.begin_session(user_id);

    let poller = self.network.spawn_polling(self.poll_interval);
    // No platform lifecycle on the command line
    let (_, lifecycle) = LifecycleEvents::channel();
    let handle = self.scheduler.start(lifecycle);
    info!(user_id, "watching for sync triggers");

    tokio::signal::ctrl_c().await?;

    handle.shutdown().await;
    poller.abort();

    match self.scheduler.run_before_suspend().await {
      SyncOutcome::Completed(report) if report.remaining > 0 => {
        warn!(remaining = report.remaining, "exiting with unsynced records");
      }
      outcome => info!(?outcome, "final sync"),
    }

    self.scheduler.end_session();
    Ok(())
  }
}
