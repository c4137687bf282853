use std::path::PathBuf;
use std::sync::Arc;

use depot_cache::{Cache, CacheResult};
use depot_hash::HashBuilder;
use depot_upstream::Upstream;
use tokio_util::sync::CancellationToken;

use crate::trim;

/// Cached content-addressable storage handler state.
///
/// Cheap to clone; used as the axum router state for [`put_blob`] and
/// [`get_blob`].
///
/// [`put_blob`]: crate::put_blob
/// [`get_blob`]: crate::get_blob
#[derive(Clone)]
pub struct CasStorage {
    inner: Arc<Inner>,
}

struct Inner {
    base_url: String,
    cache: Cache,
    upstream: Arc<dyn Upstream>,
    cancel: CancellationToken,
}

impl CasStorage {
    /// Open the local cache under `cache_dir` (created if absent) and wire
    /// it to `upstream`.
    ///
    /// When `cache_max_bytes` is non-zero a background task trims the cache
    /// to that budget every [`CACHE_TRIM_INTERVAL`] until `cancel` fires.
    ///
    /// `base_url` is the public prefix of canonical blob URLs, without a
    /// trailing slash (e.g. `https://mirror.example.com/blobs`).
    ///
    /// [`CACHE_TRIM_INTERVAL`]: crate::CACHE_TRIM_INTERVAL
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        cache_max_bytes: u64,
        hash: HashBuilder,
        base_url: impl Into<String>,
        upstream: Arc<dyn Upstream>,
        cancel: CancellationToken,
    ) -> CacheResult<Self> {
        let dir = cache_dir.into();
        std::fs::create_dir_all(&dir)?;

        let cache = Cache::open(dir, hash, None)?;

        if cache_max_bytes > 0 {
            trim::spawn(cache.clone(), cache_max_bytes, cancel.clone());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                base_url: base_url.into(),
                cache,
                upstream,
                cancel,
            }),
        })
    }

    pub fn cache(&self) -> &Cache {
        &self.inner.cache
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.inner.upstream
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.inner.cancel
    }
}
