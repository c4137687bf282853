use async_trait::async_trait;
use depot_hash::BlobId;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::{UpstreamError, UpstreamResult};
use crate::traits::{ByteStream, Upstream};

/// Options for connecting to a WebDAV collection.
#[derive(Clone, Debug)]
pub struct WebDavOptions {
    /// URL of the collection blobs are stored in.
    pub uri: String,
    pub username: String,
    pub password: String,
}

/// WebDAV-backed [`Upstream`].
///
/// Objects are named by the Base58 form of their id directly under the
/// collection URL. Connections are lazy: construction only validates the
/// URI, and the first request surfaces connectivity problems.
#[derive(Clone)]
pub struct WebDav {
    client: Client,
    base: Url,
    username: String,
    password: String,
}

impl std::fmt::Debug for WebDav {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDav")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl WebDav {
    pub fn new(opts: WebDavOptions) -> UpstreamResult<Self> {
        let mut base = Url::parse(&opts.uri)
            .map_err(|e| UpstreamError::Transport(format!("invalid WebDAV URI: {e}")))?;
        // A trailing slash makes join() append object names instead of
        // replacing the last path segment.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self {
            client: Client::new(),
            base,
            username: opts.username,
            password: opts.password,
        })
    }

    fn object_url(&self, id: BlobId) -> UpstreamResult<Url> {
        self.base
            .join(&id.to_base58())
            .map_err(|e| UpstreamError::Transport(format!("building object URL: {e}")))
    }
}

#[async_trait]
impl Upstream for WebDav {
    async fn get(&self, id: BlobId) -> UpstreamResult<(ByteStream, Option<u64>)> {
        let url = self.object_url(id)?;
        let resp = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.ok();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let len = resp.content_length();
        let stream = resp.bytes_stream().map_err(UpstreamError::from);
        Ok((Box::pin(stream), len))
    }

    async fn put(&self, id: BlobId, body: ByteStream) -> UpstreamResult<()> {
        let url = self.object_url(id)?;
        let resp = self
            .client
            .put(url)
            .basic_auth(&self.username, Some(&self.password))
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.ok();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
