use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::remote::PAGE_SIZE;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  /// Local store location (defaults to the platform data directory)
  pub database_path: Option<PathBuf>,
  /// User whose session is active when none is given on the command line
  pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Backend base URL, e.g. https://project.supabase.co
  pub url: String,
  /// Path of the REST schema under `url`
  #[serde(default = "default_schema_path")]
  pub schema_path: String,
}

fn default_schema_path() -> String {
  "/rest/v1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Seconds between timer-triggered sync cycles
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
  /// Rows per page for full-table fetches
  #[serde(default = "default_page_size")]
  pub page_size: usize,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_interval_secs(),
      page_size: default_page_size(),
    }
  }
}

impl SyncConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }
}

fn default_interval_secs() -> u64 {
  60
}

fn default_page_size() -> usize {
  PAGE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  /// Upper bound for one connectivity check
  #[serde(default = "default_probe_timeout_ms")]
  pub probe_timeout_ms: u64,
  /// Seconds between background connectivity checks
  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_secs: u64,
  /// URL probed for connectivity (defaults to the remote url)
  pub probe_url: Option<String>,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      probe_timeout_ms: default_probe_timeout_ms(),
      poll_interval_secs: default_poll_interval_secs(),
      probe_url: None,
    }
  }
}

impl NetworkConfig {
  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs.max(1))
  }
}

fn default_probe_timeout_ms() -> u64 {
  3000
}

fn default_poll_interval_secs() -> u64 {
  5
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./fleetsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fleetsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/fleetsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("fleetsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fleetsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub(crate) fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// URL used by the connectivity probe.
  pub fn probe_url(&self) -> &str {
    self.network.probe_url.as_deref().unwrap_or(&self.remote.url)
  }

  /// Get the remote API key from environment variables.
  ///
  /// Checks FLEETSYNC_REMOTE_KEY first, then SUPABASE_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("FLEETSYNC_REMOTE_KEY")
      .or_else(|_| std::env::var("SUPABASE_KEY"))
      .map_err(|_| {
        eyre!("Remote API key not found. Set FLEETSYNC_REMOTE_KEY or SUPABASE_KEY environment variable.")
      })
  }
}
