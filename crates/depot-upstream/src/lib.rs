#![forbid(unsafe_code)]

//! Remote blob store capability.
//!
//! The upstream is a dumb content-addressed sink/source keyed by the same
//! blob id as the local cache. It never verifies content; the cache does.

mod error;
mod traits;
mod webdav;

pub use error::{UpstreamError, UpstreamResult};
pub use traits::{ByteStream, Upstream};
pub use webdav::{WebDav, WebDavOptions};
