#![forbid(unsafe_code)]

//! Cached content-addressable storage behind HTTP handlers.
//!
//! [`CasStorage`] composes the local blob cache with an upstream blob store:
//! uploads are hashed, committed locally and mirrored upstream before the
//! client gets its canonical URL; downloads are served from the cache when
//! possible and otherwise streamed from upstream to the client and into the
//! cache at the same time.

mod error;
mod handlers;
mod storage;
mod transfer;
mod trim;

pub use error::CasError;
pub use handlers::{get_blob, put_blob};
pub use storage::CasStorage;
pub use trim::CACHE_TRIM_INTERVAL;
