use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use fleetsync::cache::{CacheResult, ReferenceEntity};
use fleetsync::config::Config;
use fleetsync::models::{FleetTag, Part, TimeRecord};
use fleetsync::sync::{SyncOutcome, SyncTrigger};
use fleetsync::App;

#[derive(Parser, Debug)]
#[command(name = "fleetsync")]
#[command(about = "Local-first sync for fleet parts and time tracking")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fleetsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the network as unavailable
  #[arg(long)]
  offline: bool,

  /// Log to stderr instead of the log file
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List or search parts
  Parts {
    #[arg(short, long)]
    search: Option<String>,
  },
  /// List or search fleet tags
  FleetTags {
    #[arg(short, long)]
    search: Option<String>,
  },
  /// Record entry/exit times or a day status
  Punch {
    #[arg(short, long)]
    user: Option<String>,
    /// Day to record (default: today)
    #[arg(short, long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    entry: Option<String>,
    #[arg(long)]
    exit: Option<String>,
    #[arg(long, conflicts_with_all = ["entry", "exit"])]
    status: Option<String>,
  },
  /// List a user's time records
  Records {
    #[arg(short, long)]
    user: Option<String>,
  },
  /// Push unsynced records now
  Sync {
    #[arg(short, long)]
    user: Option<String>,
  },
  /// Keep syncing in the background until Ctrl-C
  Watch {
    #[arg(short, long)]
    user: Option<String>,
  },
}

/// Set up tracing. The returned guard flushes the log file on drop.
fn init_logging(verbose: bool) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleetsync=info"));

  if verbose {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  }

  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("fleetsync");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "fleetsync.log"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}

fn user_or_default(user: Option<String>, config: &Config) -> Result<String> {
  user
    .or_else(|| config.user_id.clone())
    .ok_or_else(|| eyre!("No user given. Pass --user or set user_id in the config file."))
}

fn print_source<T>(result: &CacheResult<T>) {
  match result.cached_at {
    Some(at) => println!("# source: {} (cached {})", result.source, at),
    None => println!("# source: {}", result.source),
  }
}

async fn list_reference<T: ReferenceEntity>(
  app: &App,
  search: Option<&str>,
  line: impl Fn(&T) -> String,
) -> Result<()> {
  let result = match search {
    Some(query) => app.reference.search::<T>(query).await?,
    None => app.reference.get_all::<T>().await?,
  };

  print_source(&result);
  for entity in &result.data {
    println!("{}", line(entity));
  }
  Ok(())
}

fn record_line(record: &TimeRecord) -> String {
  let times = match &record.status {
    Some(status) => status.clone(),
    None => format!(
      "{} - {}",
      record.entry_time.as_deref().unwrap_or("--:--"),
      record.exit_time.as_deref().unwrap_or("--:--")
    ),
  };
  let marker = if record.is_dirty() { " *" } else { "" };
  format!("{}  {}{}", record.date, times, marker)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.verbose)?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let app = App::new(&config, args.offline)?;

  match args.command {
    Command::Parts { search } => {
      list_reference::<Part>(&app, search.as_deref(), |p| {
        format!(
          "{:<12} {:<24} {}",
          p.code,
          p.name.as_deref().unwrap_or(""),
          p.description
        )
      })
      .await?;
    }
    Command::FleetTags { search } => {
      list_reference::<FleetTag>(&app, search.as_deref(), |t| {
        format!("{:<12} {}", t.number, t.description.as_deref().unwrap_or(""))
      })
      .await?;
    }
    Command::Punch {
      user,
      date,
      entry,
      exit,
      status,
    } => {
      let user = user_or_default(user, &config)?;
      let date = date.unwrap_or_else(|| Utc::now().date_naive());

      let mut record = app
        .records
        .find_for_day(&user, date)?
        .unwrap_or_else(|| TimeRecord::new(user.as_str(), date));
      match status {
        Some(status) => record.set_status(status),
        None => {
          let entry = entry.or(record.entry_time.take());
          let exit = exit.or(record.exit_time.take());
          record.set_times(entry, exit);
        }
      }

      match app.records.upsert(record).await {
        Ok(saved) => println!("{}", record_line(&saved)),
        Err(e) if e.is_remote() => {
          // Saved locally, the next sync cycle retries
          eprintln!("warning: saved locally but not synced: {}", e);
        }
        Err(e) => return Err(e.into()),
      }
    }
    Command::Records { user } => {
      let user = user_or_default(user, &config)?;
      let result = app.records.get_all(&user).await?;
      print_source(&result);
      for record in &result.data {
        println!("{}", record_line(record));
      }
    }
    Command::Sync { user } => {
      let user = user_or_default(user, &config)?;
      app.scheduler.begin_session(user);
      match app.scheduler.request_sync(SyncTrigger::Manual).await {
        SyncOutcome::Completed(report) => {
          println!("pushed {}, remaining {}", report.pushed, report.remaining);
          if let Some(error) = report.error {
            return Err(eyre!("sync stopped early: {}", error));
          }
        }
        SyncOutcome::Skipped(reason) => println!("sync skipped: {:?}", reason),
      }
    }
    Command::Watch { user } => {
      let user = user_or_default(user, &config)?;
      app.watch(&user).await?;
    }
  }

  Ok(())
}
