use axum::body::Body;
use axum::extract::multipart::{Field, Multipart};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use depot_hash::BlobId;
use depot_upstream::UpstreamError;
use futures::TryStreamExt;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::error::CasError;
use crate::storage::CasStorage;
use crate::transfer::{self, STREAM_CHUNK};

/// Escaping for the filename segment of a canonical blob URL: everything a
/// path segment cannot carry verbatim.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// `POST /blob` — store a multipart upload and mirror it upstream.
///
/// Replies `201 Created` with the canonical blob URL as a plain-text body.
pub async fn put_blob(
    State(storage): State<CasStorage>,
    mut multipart: Multipart,
) -> Result<Response, CasError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CasError::BadRequest(format!("reading multipart form: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let location = store_field(&storage, field).await?;
        return Response::builder()
            .status(StatusCode::CREATED)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from(location))
            .map_err(|e| CasError::Internal(format!("building response: {e}")));
    }

    Err(CasError::BadRequest("missing form field \"file\"".into()))
}

async fn store_field(storage: &CasStorage, mut field: Field<'_>) -> Result<String, CasError> {
    let filename = field.file_name().unwrap_or("file").to_string();
    info!(name = %filename, "received request to store blob");

    let internal = |e: std::io::Error| CasError::Internal(format!("temporary blob file: {e}"));

    // Spool the upload to a temp file; the cache needs a rewindable source
    // to hash it before committing. Dropped (and so removed) on every exit
    // path out of this function.
    let tmp = tempfile::Builder::new()
        .prefix("blob-")
        .tempfile()
        .map_err(internal)?;
    let mut file = tokio::fs::File::from_std(tmp.reopen().map_err(internal)?);

    loop {
        // Poll cancellation before each chunk so shutdown interrupts
        // uploads that are still trickling in.
        if storage.cancel().is_cancelled() {
            return Err(CasError::Internal("shutting down".into()));
        }
        match field.chunk().await {
            Ok(Some(bytes)) => file.write_all(&bytes).await.map_err(internal)?,
            Ok(None) => break,
            Err(e) => return Err(CasError::Internal(format!("reading upload: {e}"))),
        }
    }

    file.sync_all().await.map_err(internal)?;
    file.rewind().await.map_err(internal)?;

    let (id, size) = storage
        .cache()
        .put(&mut file)
        .await
        .map_err(|e| CasError::Internal(format!("storing blob in cache: {e}")))?;
    let encoded = id.to_base58();
    info!(name = %filename, id = %encoded, size, "stored blob");

    // The cache is authoritative for the id; the upstream is a mirror fed
    // from the committed cache file, not from the upload.
    let (path, _) = storage
        .cache()
        .get_file(id)
        .await
        .map_err(|e| CasError::Internal(format!("reading back cached blob: {e}")))?;
    let reader = tokio::fs::File::open(&path)
        .await
        .map_err(|e| CasError::Internal(format!("opening cached blob: {e}")))?;
    let stream = ReaderStream::with_capacity(reader, STREAM_CHUNK).map_err(UpstreamError::from);
    storage
        .upstream()
        .put(id, Box::pin(stream))
        .await
        .map_err(|e| CasError::Internal(format!("uploading blob to upstream: {e}")))?;

    Ok(format!(
        "{}/{}/{}",
        storage.base_url(),
        encoded,
        utf8_percent_encode(&filename, PATH_SEGMENT)
    ))
}

/// `GET /blobs/:id/:name` — serve a blob by its Base58 id.
///
/// Cache hits stream straight from the data file with a `Content-Length`;
/// misses are fetched through from the upstream (see [`transfer`]).
pub async fn get_blob(
    State(storage): State<CasStorage>,
    Path((encoded, _name)): Path<(String, String)>,
) -> Result<Response, CasError> {
    debug!(id = %encoded, "received request for blob");

    let id = BlobId::from_base58(&encoded)
        .map_err(|e| CasError::BadRequest(format!("invalid blob id {encoded:?}: {e}")))?;

    match storage.cache().get_file(id).await {
        Ok((path, entry)) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| CasError::Internal(format!("opening cached blob: {e}")))?;
            info!(id = %encoded, "blob found in local cache");
            return Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_LENGTH, entry.size)
                .body(Body::from_stream(ReaderStream::with_capacity(
                    file,
                    STREAM_CHUNK,
                )))
                .map_err(|e| CasError::Internal(format!("building response: {e}")));
        }
        Err(e) if e.is_not_found() => {
            debug!(id = %encoded, "blob not found in local cache");
        }
        Err(e) => {
            return Err(CasError::Internal(format!("reading blob from cache: {e}")));
        }
    }

    let (body, _len) = match storage.upstream().get(id).await {
        Ok(found) => found,
        Err(UpstreamError::NotFound) => return Err(CasError::NotFound),
        Err(e) => {
            warn!(id = %encoded, error = %e, "failed to fetch blob from upstream");
            return Err(CasError::Internal(format!("fetching blob upstream: {e}")));
        }
    };

    transfer::serve_and_cache(&storage, id, body).await
}
