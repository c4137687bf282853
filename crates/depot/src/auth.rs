//! Static bearer-token authentication for uploads.

use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Expected bearer token, injected into request extensions.
///
/// `Debug` redacts the value so the token cannot leak through logs.
#[derive(Clone)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthToken").field(&"[REDACTED]").finish()
    }
}

/// Constant-time token comparison, with a dummy comparison on length
/// mismatch so timing does not reveal the expected length either.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Reject requests that do not carry `Authorization: Bearer <token>`.
pub async fn bearer_auth(request: Request, next: Next) -> Response {
    let Some(expected) = request.extensions().get::<AuthToken>().cloned() else {
        // Misconfigured stack; fail closed.
        warn!("bearer middleware running without an AuthToken extension");
        return unauthorized();
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_token_eq(token, &expected.0) => next.run(request).await,
        Some(_) => {
            warn!("authentication failed: invalid bearer token");
            unauthorized()
        }
        None => {
            warn!("authentication failed: missing or non-bearer authorization header");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}
