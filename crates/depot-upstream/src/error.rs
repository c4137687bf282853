use thiserror::Error;

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Errors from a remote blob store.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Canonical "the upstream does not have this blob". Callers match this
    /// to distinguish a true miss from a transport failure.
    #[error("blob not found upstream")]
    NotFound,

    #[error("upstream returned HTTP {status}: {body:?}")]
    Http { status: u16, body: Option<String> },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        // Alternate formatting includes the source chain, e.g.
        // "error sending request: connection refused".
        Self::Transport(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_matchable() {
        let err = UpstreamError::NotFound;
        assert!(matches!(err, UpstreamError::NotFound));
        assert_eq!(err.to_string(), "blob not found upstream");
    }

    #[test]
    fn http_error_display_includes_status() {
        let err = UpstreamError::Http {
            status: 503,
            body: Some("unavailable".into()),
        };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<UpstreamError>();
    }
}
