//! Local store for the sync core.
//!
//! Holds the on-device copy of every entity:
//! - Reference tables (parts, fleet tags) mirrored wholesale from the remote
//! - Time records written locally first, carrying a `synced_at` dirty marker
//!
//! The `synced_at` column is the whole outbox; there is no separate queue.

mod entities;
mod storage;
mod traits;

pub use storage::{CachedTable, LocalStore, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Cacheable, ReferenceEntity};
