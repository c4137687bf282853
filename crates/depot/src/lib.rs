#![forbid(unsafe_code)]

//! Server assembly for the depot blob mirror.
//!
//! The binary wires a [`depot_cas::CasStorage`] behind two routes:
//! `POST /blob` (bearer-token protected uploads) and `GET /blobs/:id/:name`
//! (public downloads).

pub mod auth;
pub mod config;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::{Extension, Router};
use depot_cas::{CasStorage, get_blob, put_blob};
use tower_http::trace::TraceLayer;

use crate::auth::AuthToken;

/// Assemble the application router.
///
/// Uploads sit behind the bearer middleware; downloads are public. The
/// default body limit is disabled for uploads, which stream to disk rather
/// than buffering in memory.
pub fn app(storage: CasStorage, token: AuthToken) -> Router {
    let uploads = Router::new()
        .route("/blob", post(put_blob))
        .layer(DefaultBodyLimit::disable())
        .layer(from_fn(auth::bearer_auth))
        .layer(Extension(token));

    let downloads = Router::new().route("/blobs/:id/:name", get(get_blob));

    Router::new()
        .merge(uploads)
        .merge(downloads)
        .layer(TraceLayer::new_for_http())
        .with_state(storage)
}
