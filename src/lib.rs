//! Local-first sync core for fleet parts and service-order time tracking.
//!
//! - Reference data (parts, fleet tags) is mirrored wholesale from the remote
//!   store and written strictly online.
//! - Time records are written locally first and pushed opportunistically;
//!   unconfirmed rows stay dirty until a sync cycle pushes them.

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod models;
pub mod network;
pub mod records;
pub mod reference;
pub mod remote;
pub mod search;
pub mod sync;

pub use app::App;
pub use error::{Result, SyncError};
