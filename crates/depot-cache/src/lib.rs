#![forbid(unsafe_code)]

//! Durable on-disk content-addressed blob cache.
//!
//! Blobs are stored under a two-level directory keyed by the first byte of
//! their id: `dir/xx/<hex id>-d` holds the raw bytes and `dir/xx/<hex id>-a`
//! holds a fixed-width ASCII index record with the size and last-used time.
//!
//! The cache is safe for concurrent use across tasks and processes without
//! locks. Data files are published with a verify-then-commit protocol that
//! withholds the final byte until the recomputed digest matches the id, so a
//! reader either sees the complete blob or a file that is visibly short.
//! Index records have a fixed length and a strict shape; any record that
//! fails validation is treated as missing, never as corruption, and is
//! rewritten by the next put for the same id.

mod cache;
mod error;
mod index;
mod trim;

pub use cache::{Cache, Entry, NowFn};
pub use error::{CacheError, CacheResult};
pub use index::ENTRY_SIZE;

use std::time::Duration;

/// Hysteresis for last-used mtime refreshes: a file's mtime is only bumped
/// when it is at least this old, bounding metadata write rate on hot blobs.
pub const MTIME_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Entries untouched for this long are eligible for age-based trimming.
pub const TRIM_LIMIT: Duration = Duration::from_secs(5 * 24 * 60 * 60);
