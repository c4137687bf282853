//! WebDAV client tests against a local HTTP server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use depot_hash::BlobId;
use depot_test_utils::TestHttpServer;
use depot_upstream::{ByteStream, Upstream, UpstreamError, WebDav, WebDavOptions};
use futures::StreamExt;

#[derive(Clone, Default)]
struct DavState {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

async fn get_object(State(state): State<DavState>, Path(name): Path<String>) -> Response {
    match state.objects.lock().unwrap().get(&name) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn put_object(
    State(state): State<DavState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        state.auth_headers.lock().unwrap().push(auth.to_string());
    }
    state.objects.lock().unwrap().insert(name, body);
    StatusCode::CREATED
}

fn dav_router(state: DavState) -> Router {
    Router::new()
        .route("/dav/:name", get(get_object).put(put_object))
        .with_state(state)
}

fn client_for(server: &TestHttpServer) -> WebDav {
    WebDav::new(WebDavOptions {
        uri: server.url("/dav/").to_string(),
        username: "storage-user".into(),
        password: "storage-pass".into(),
    })
    .expect("build WebDAV client")
}

fn body_of(chunks: &[&'static [u8]]) -> ByteStream {
    let items: Vec<_> = chunks
        .iter()
        .map(|c| Ok(Bytes::from_static(c)))
        .collect();
    futures::stream::iter(items).boxed()
}

async fn collect(mut stream: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.expect("stream chunk"));
    }
    out
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let state = DavState::default();
    let server = TestHttpServer::new(dav_router(state.clone())).await;
    let dav = client_for(&server);

    let id = BlobId::from_bytes([0x42; 32]);
    dav.put(id, body_of(&[b"hello ", b"world"])).await.unwrap();

    // Stored under the Base58 object name.
    assert!(
        state
            .objects
            .lock()
            .unwrap()
            .contains_key(&id.to_base58())
    );

    let (stream, len) = dav.get(id).await.unwrap();
    assert_eq!(len, Some(11));
    assert_eq!(collect(stream).await, b"hello world");
}

#[tokio::test]
async fn put_sends_basic_auth() {
    let state = DavState::default();
    let server = TestHttpServer::new(dav_router(state.clone())).await;
    let dav = client_for(&server);

    dav.put(BlobId::from_bytes([1; 32]), body_of(&[b"x"]))
        .await
        .unwrap();

    let headers = state.auth_headers.lock().unwrap();
    assert_eq!(headers.len(), 1);
    assert!(headers[0].starts_with("Basic "), "{}", headers[0]);
}

#[tokio::test]
async fn missing_object_maps_to_not_found() {
    let server = TestHttpServer::new(dav_router(DavState::default())).await;
    let dav = client_for(&server);

    let err = dav.get(BlobId::from_bytes([9; 32])).await.err().unwrap();
    assert!(matches!(err, UpstreamError::NotFound), "{err}");
}

#[tokio::test]
async fn server_error_maps_to_http_error() {
    let router = Router::new().route(
        "/dav/:name",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let server = TestHttpServer::new(router).await;
    let dav = client_for(&server);

    let err = dav.get(BlobId::from_bytes([9; 32])).await.err().unwrap();
    assert!(
        matches!(err, UpstreamError::Http { status: 503, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    // Nothing listens on this port by the time the request is made.
    let dav = {
        let server = TestHttpServer::new(dav_router(DavState::default())).await;
        client_for(&server)
        // server dropped here, listener shut down
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let err = dav.get(BlobId::from_bytes([9; 32])).await.err().unwrap();
    assert!(matches!(err, UpstreamError::Transport(_)), "{err}");
}
