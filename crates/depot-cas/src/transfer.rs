//! Dual-sink transfer: stream an upstream blob to the client while
//! persisting it for the cache.
//!
//! A producer task copies the upstream body into a temp file and publishes
//! its write frontier through a `watch` channel — a coalescing "data
//! available" signal, not a data pipe. The response body is a stream that
//! reads strictly behind that frontier from an independent handle on the
//! same file, so the client sees bytes as soon as they are durable without
//! the transfer ever waiting on the client. Once the producer finishes and
//! the client side is drained, the temp file is rewound and inserted into
//! the cache.

use std::io;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use depot_hash::BlobId;
use depot_upstream::ByteStream;
use futures::{Stream, StreamExt};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CasError;
use crate::storage::CasStorage;

/// Chunk size for reading the temp file back out to the client.
pub(crate) const STREAM_CHUNK: usize = 32 * 1024;

/// Producer-side progress, published through the watch channel.
#[derive(Clone, Copy, Debug, Default)]
struct TransferState {
    /// Bytes written to the temp file so far.
    written: u64,
    /// The producer has stopped, successfully or not.
    done: bool,
    /// The transfer failed; the consumer must terminate the connection.
    failed: bool,
}

/// Serve `body` to the client while persisting it into the cache.
///
/// Does not reply until the first bytes have landed in the temp file (or
/// the transfer ended), so a transfer that dies before producing anything
/// still gets a clean `500` instead of a broken `200`.
pub(crate) async fn serve_and_cache(
    storage: &CasStorage,
    id: BlobId,
    body: ByteStream,
) -> Result<Response, CasError> {
    let internal = |e: io::Error| CasError::Internal(format!("temporary blob file: {e}"));

    let tmp = tempfile::Builder::new()
        .prefix("blob-")
        .tempfile()
        .map_err(internal)?;
    let writer = tokio::fs::File::from_std(tmp.reopen().map_err(internal)?);
    let reader = tokio::fs::File::from_std(tmp.reopen().map_err(internal)?);

    let (tx, rx) = watch::channel(TransferState::default());
    tokio::spawn(produce(
        storage.clone(),
        id,
        tmp,
        writer,
        body,
        tx,
        storage.cancel().clone(),
    ));

    let mut first = rx.clone();
    loop {
        let state = *first.borrow_and_update();
        // Any written bytes commit us to a 200: the body stream delivers
        // them and terminates the connection if the transfer fails later.
        if state.written > 0 {
            break;
        }
        if state.failed {
            return Err(CasError::Internal("transferring blob from upstream".into()));
        }
        if state.done {
            break;
        }
        if first.changed().await.is_err() {
            return Err(CasError::Internal("blob transfer task stopped".into()));
        }
    }
    drop(first);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(tail_stream(reader, rx)))
        .map_err(|e| CasError::Internal(format!("building response: {e}")))
}

/// Copy the upstream body into the temp file, publishing progress, then
/// insert the finished blob into the cache.
///
/// Owns the [`NamedTempFile`], so the file is unlinked whenever this task
/// ends; the consumer's already-open handle is unaffected.
async fn produce(
    storage: CasStorage,
    id: BlobId,
    tmp: NamedTempFile,
    mut dst: tokio::fs::File,
    mut body: ByteStream,
    tx: watch::Sender<TransferState>,
    cancel: CancellationToken,
) {
    let mut written: u64 = 0;
    let copied: Result<(), String> = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break Err("shutting down".into()),
            () = tx.closed() => break Err("client went away".into()),
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    if let Err(e) = dst.write_all(&bytes).await {
                        break Err(format!("writing temporary blob file: {e}"));
                    }
                    written += bytes.len() as u64;
                    tx.send_modify(|s| s.written = written);
                }
                Some(Err(e)) => break Err(format!("reading blob from upstream: {e}")),
                None => break Ok(()),
            },
        }
    };

    let flushed = match copied {
        Ok(()) => dst
            .flush()
            .await
            .map_err(|e| format!("flushing temporary blob file: {e}")),
        Err(e) => Err(e),
    };

    if let Err(reason) = flushed {
        tx.send_modify(|s| {
            s.done = true;
            s.failed = true;
        });
        warn!(id = %id.to_base58(), reason = %reason, "blob transfer from upstream failed");
        return;
    }

    tx.send_modify(|s| s.done = true);

    // Wait until the client side has dropped its receiver before hashing
    // the blob into the cache: the insert must never delay the response.
    tx.closed().await;

    let mut src = match tmp.reopen() {
        Ok(f) => tokio::fs::File::from_std(f),
        Err(e) => {
            warn!(id = %id.to_base58(), error = %e, "failed to reopen temporary blob file");
            return;
        }
    };
    match storage.cache().put(&mut src).await {
        Ok((cached_id, size)) => {
            debug!(id = %cached_id.to_base58(), size, "cached blob fetched from upstream");
        }
        Err(e) => warn!(id = %id.to_base58(), error = %e, "failed to store blob in cache"),
    }
}

/// Stream the temp file to the client, staying behind the producer's write
/// frontier: each pass reads at most `frontier - consumed` bytes, in chunks
/// of up to [`STREAM_CHUNK`].
fn tail_stream(
    mut src: tokio::fs::File,
    mut rx: watch::Receiver<TransferState>,
) -> impl Stream<Item = io::Result<Bytes>> + Send {
    async_stream::stream! {
        let mut consumed: u64 = 0;
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            let state = *rx.borrow_and_update();

            while consumed < state.written {
                let want = ((state.written - consumed) as usize).min(buf.len());
                if let Err(e) = src.read_exact(&mut buf[..want]).await {
                    yield Err(e);
                    return;
                }
                consumed += want as u64;
                yield Ok(Bytes::copy_from_slice(&buf[..want]));
            }

            if state.failed {
                yield Err(io::Error::other("upstream transfer failed"));
                return;
            }
            if state.done {
                return;
            }
            if rx.changed().await.is_err() {
                // Producer died without marking completion.
                yield Err(io::Error::other("blob transfer task stopped"));
                return;
            }
        }
    }
}
