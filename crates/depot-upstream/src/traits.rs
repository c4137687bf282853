use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use depot_hash::BlobId;
use futures::Stream;

use crate::error::UpstreamResult;

/// Streaming blob body.
pub type ByteStream = Pin<Box<dyn Stream<Item = UpstreamResult<Bytes>> + Send>>;

/// Remote blob fetch/store keyed by blob id.
///
/// Implementations bundle their own connection state and are shared behind
/// an `Arc<dyn Upstream>` by the request handlers.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch a blob. Returns the body stream and, when the backend can
    /// provide it without reading the body, its length.
    ///
    /// A genuine miss is [`UpstreamError::NotFound`], distinguishable from
    /// transport errors.
    ///
    /// [`UpstreamError::NotFound`]: crate::UpstreamError::NotFound
    async fn get(&self, id: BlobId) -> UpstreamResult<(ByteStream, Option<u64>)>;

    /// Store a blob under its id, consuming the body stream.
    async fn put(&self, id: BlobId, body: ByteStream) -> UpstreamResult<()>;
}
