//! In-memory [`Upstream`] for handler tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use depot_hash::BlobId;
use depot_upstream::{ByteStream, Upstream, UpstreamError, UpstreamResult};
use futures::StreamExt;
use parking_lot::Mutex;

/// Chunk size used when replaying stored blobs, small enough that
/// multi-chunk delivery paths get exercised.
const REPLAY_CHUNK: usize = 8 * 1024;

/// HashMap-backed upstream with failure injection.
#[derive(Clone, Default)]
pub struct MemUpstream {
    blobs: Arc<Mutex<HashMap<BlobId, Bytes>>>,
    fail_gets: Arc<AtomicBool>,
    fail_puts: Arc<AtomicBool>,
    poison_bodies: Arc<AtomicBool>,
}

impl MemUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob directly, bypassing `put`.
    pub fn insert(&self, id: BlobId, bytes: impl Into<Bytes>) {
        self.blobs.lock().insert(id, bytes.into());
    }

    pub fn contains(&self, id: BlobId) -> bool {
        self.blobs.lock().contains_key(&id)
    }

    pub fn bytes(&self, id: BlobId) -> Option<Bytes> {
        self.blobs.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    /// Make every `get` fail with a transport error.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make every `put` fail with a transport error.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make `get` succeed but deliver a body that errors after its first
    /// chunk, for exercising mid-stream failure handling.
    pub fn poison_bodies(&self, poison: bool) {
        self.poison_bodies.store(poison, Ordering::SeqCst);
    }
}

#[async_trait]
impl Upstream for MemUpstream {
    async fn get(&self, id: BlobId) -> UpstreamResult<(ByteStream, Option<u64>)> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(UpstreamError::Transport("injected get failure".into()));
        }

        let bytes = self
            .blobs
            .lock()
            .get(&id)
            .cloned()
            .ok_or(UpstreamError::NotFound)?;
        let len = bytes.len() as u64;

        let mut chunks: Vec<UpstreamResult<Bytes>> = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let take = rest.len().min(REPLAY_CHUNK);
            chunks.push(Ok(rest.split_to(take)));
        }
        if self.poison_bodies.load(Ordering::SeqCst) {
            chunks.truncate(1);
            chunks.push(Err(UpstreamError::Transport("injected body failure".into())));
        }

        Ok((futures::stream::iter(chunks).boxed(), Some(len)))
    }

    async fn put(&self, id: BlobId, mut body: ByteStream) -> UpstreamResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(UpstreamError::Transport("injected put failure".into()));
        }

        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk?);
        }
        self.blobs.lock().insert(id, Bytes::from(collected));
        Ok(())
    }
}
