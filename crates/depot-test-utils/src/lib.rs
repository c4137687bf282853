#![forbid(unsafe_code)]

//! Shared test helpers: an ephemeral HTTP server and an in-memory upstream.

mod http_server;
mod mem_upstream;

pub use http_server::TestHttpServer;
pub use mem_upstream::MemUpstream;
