use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use depot_hash::{BlobId, HashBuilder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use crate::MTIME_INTERVAL;
use crate::error::{CacheError, CacheResult};
use crate::index::{self, ENTRY_SIZE};

/// Injectable clock, used by tests to steer hysteresis and trim cutoffs.
pub type NowFn = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Chunk size for the hashing and copying passes.
const COPY_CHUNK: usize = 64 * 1024;

/// A cache entry as recorded in its index file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Length of the stored blob in bytes.
    pub size: u64,
    /// Last-used instant recorded at index-write time.
    pub time: SystemTime,
}

/// On-disk content-addressed blob cache.
///
/// Cheap to clone; clones share the directory and hash secret. All writes
/// go to per-id file names, so no locking is needed between clones, tasks,
/// or processes sharing the directory.
#[derive(Clone)]
pub struct Cache {
    dir: PathBuf,
    hash: HashBuilder,
    now: NowFn,
}

impl Cache {
    /// Open the cache rooted at `dir`.
    ///
    /// `dir` must already exist and be a directory; the 256 bucket
    /// subdirectories are created if absent. Pass `now` to inject a clock
    /// for tests; `None` uses the system clock.
    pub fn open(dir: impl Into<PathBuf>, hash: HashBuilder, now: Option<NowFn>) -> CacheResult<Self> {
        let dir = dir.into();

        let meta = std::fs::metadata(&dir)?;
        if !meta.is_dir() {
            return Err(CacheError::NotADirectory(dir));
        }

        for bucket in 0..256u32 {
            std::fs::create_dir_all(dir.join(format!("{bucket:02x}")))?;
        }

        Ok(Self {
            dir,
            hash,
            now: now.unwrap_or_else(|| Arc::new(SystemTime::now)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn bucket_dir(&self, bucket: u32) -> PathBuf {
        self.dir.join(format!("{bucket:02x}"))
    }

    fn index_path(&self, id: BlobId) -> PathBuf {
        self.bucket_dir(id.bucket() as u32)
            .join(format!("{}-a", id.to_hex()))
    }

    fn data_path(&self, id: BlobId) -> PathBuf {
        self.bucket_dir(id.bucket() as u32)
            .join(format!("{}-d", id.to_hex()))
    }

    pub(crate) fn now(&self) -> SystemTime {
        (self.now)()
    }

    /// Store a blob, returning its id and size.
    ///
    /// The source is rewound and hashed first to derive the id, then copied
    /// into the data file with verify-then-commit: the final byte is only
    /// written once the digest recomputed during the copy matches the id,
    /// so concurrent readers never observe a complete-looking file with the
    /// wrong content. Putting the same bytes twice is a no-op beyond an
    /// index refresh.
    pub async fn put<R>(&self, src: &mut R) -> CacheResult<(BlobId, u64)>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        src.rewind().await?;

        let mut hasher = self.hash.build();
        let mut size: u64 = 0;
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        let id = hasher.finalize();

        self.copy_data(src, id, size).await?;
        self.write_index_entry(id, size).await?;

        Ok((id, size))
    }

    /// Look up an entry by id, refreshing its last-used time.
    ///
    /// A hit does not guarantee the data file is still intact; use
    /// [`Cache::get_file`] to also validate and locate it.
    pub async fn get(&self, id: BlobId) -> CacheResult<Entry> {
        let entry = self.read_index_entry(id).await?;
        self.touch(id, &self.index_path(id))?;
        Ok(entry)
    }

    /// Look up an entry and return the path of its data file.
    ///
    /// Verifies the data file length against the index record; a mismatch
    /// is [`CacheError::Incomplete`], which read-path callers treat as a
    /// miss.
    pub async fn get_file(&self, id: BlobId) -> CacheResult<(PathBuf, Entry)> {
        let entry = self.get(id).await?;

        let path = self.data_path(id);
        self.touch(id, &path)?;

        let meta = std::fs::metadata(&path).map_err(|e| self.missing_io(id, e))?;
        if meta.len() != entry.size {
            return Err(CacheError::Incomplete {
                id: id.to_hex(),
                expected: entry.size,
                actual: meta.len(),
            });
        }

        Ok((path, entry))
    }

    /// Total size of the cache: the sum of sizes recorded by every readable
    /// index file. Records that fail validation are logged and counted as
    /// zero; directory traversal failures surface.
    pub async fn size(&self) -> CacheResult<u64> {
        let mut total: u64 = 0;

        for bucket in 0..256u32 {
            let subdir = self.bucket_dir(bucket);
            let mut entries = tokio::fs::read_dir(&subdir).await?;
            while let Some(dirent) = entries.next_entry().await? {
                let name = dirent.file_name();
                let name = name.to_string_lossy();
                let Some(stem) = name.strip_suffix("-a") else {
                    continue;
                };
                let id = BlobId::from_hex(stem).map_err(|e| {
                    CacheError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unexpected index file name {name:?}: {e}"),
                    ))
                })?;
                match self.read_index_entry(id).await {
                    Ok(entry) => total += entry.size,
                    Err(err) => warn!(id = %id, error = %err, "failed to read index entry"),
                }
            }
        }

        Ok(total)
    }

    async fn read_index_entry(&self, id: BlobId) -> CacheResult<Entry> {
        let path = self.index_path(id);

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) => return Err(self.missing(id, e.to_string())),
        };

        // Read one byte past the record length so oversized files are
        // detected as malformed rather than silently truncated.
        let mut buf = Vec::with_capacity(ENTRY_SIZE + 1);
        (&mut file)
            .take(ENTRY_SIZE as u64 + 1)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| self.missing(id, e.to_string()))?;

        index::parse_record(id, &buf).map_err(|reason| self.missing(id, reason))
    }

    fn missing(&self, id: BlobId, reason: String) -> CacheError {
        CacheError::Missing {
            id: id.to_hex(),
            reason,
        }
    }

    fn missing_io(&self, id: BlobId, err: io::Error) -> CacheError {
        if err.kind() == io::ErrorKind::NotFound {
            self.missing(id, err.to_string())
        } else {
            CacheError::Io(err)
        }
    }

    /// Refresh a file's mtime, subject to hysteresis: no-op while the
    /// current mtime is younger than [`MTIME_INTERVAL`]. Best-effort races
    /// between concurrent refreshes are benign.
    fn touch(&self, id: BlobId, path: &Path) -> CacheResult<()> {
        let now = self.now();
        if let Ok(meta) = std::fs::metadata(path)
            && let Ok(mtime) = meta.modified()
        {
            match now.duration_since(mtime) {
                Ok(age) if age >= MTIME_INTERVAL => {}
                // Young enough, or mtime is in the future (clock skew).
                _ => return Ok(()),
            }
        }
        self.set_file_times(path).map_err(|e| self.missing_io(id, e))
    }

    fn set_file_times(&self, path: &Path) -> io::Result<()> {
        let now = self.now();
        let file = std::fs::OpenOptions::new().write(true).open(path)?;
        file.set_times(
            std::fs::FileTimes::new()
                .set_accessed(now)
                .set_modified(now),
        )
    }

    /// Copy `src` into the data file for `id`, unless a matching copy is
    /// already present.
    async fn copy_data<R>(&self, src: &mut R, id: BlobId, size: u64) -> CacheResult<()>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let path = self.data_path(id);

        let existing_len = std::fs::metadata(&path).ok().map(|m| m.len());
        if existing_len == Some(size) && self.data_matches(&path, id).await? {
            return Ok(());
        }

        let mut opts = tokio::fs::OpenOptions::new();
        opts.read(true).write(true).create(true);
        if existing_len.is_some_and(|len| len > size) {
            // Shouldn't happen, but clear stale tails from prior damage.
            opts.truncate(true);
        }
        let mut dst = opts.open(&path).await?;

        if size == 0 {
            // Only one possible zero-length content, so the (empty) file is
            // already correct and there is no final byte to withhold.
            drop(dst);
            self.set_file_times(&path)?;
            return Ok(());
        }

        src.rewind().await?;

        // Tee the copy through a second hasher. If anything fails from here
        // on, truncate to zero so no reader mistakes a partial file for a
        // short-but-complete one.
        let mut hasher = self.hash.build();
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut remaining = size - 1;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = match src.read(&mut buf[..want]).await {
                Ok(0) => {
                    let _ = dst.set_len(0).await;
                    return Err(CacheError::ContentChanged);
                }
                Ok(n) => n,
                Err(e) => {
                    let _ = dst.set_len(0).await;
                    return Err(e.into());
                }
            };
            hasher.update(&buf[..n]);
            if let Err(e) = dst.write_all(&buf[..n]).await {
                let _ = dst.set_len(0).await;
                return Err(e.into());
            }
            remaining -= n as u64;
        }

        // Check the final byte before writing it: writing it makes the file
        // length match the index record, which is the moment concurrent
        // readers may start using the file.
        let mut last = [0u8; 1];
        if let Err(e) = src.read_exact(&mut last).await {
            let _ = dst.set_len(0).await;
            return Err(e.into());
        }
        hasher.update(&last);
        if hasher.finalize() != id {
            let _ = dst.set_len(0).await;
            return Err(CacheError::ContentChanged);
        }

        if let Err(e) = dst.write_all(&last).await {
            let _ = dst.set_len(0).await;
            return Err(e.into());
        }
        if let Err(e) = dst.flush().await {
            // The file may look complete without actually holding the final
            // byte; remove it rather than leave a lie behind.
            drop(dst);
            let _ = std::fs::remove_file(&path);
            return Err(e.into());
        }
        drop(dst);

        self.set_file_times(&path)?;
        Ok(())
    }

    /// Recompute the digest of an existing data file.
    async fn data_matches(&self, path: &Path, id: BlobId) -> CacheResult<bool> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(_) => return Ok(false),
        };

        let mut hasher = self.hash.build();
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hasher.finalize() == id)
    }

    async fn write_index_entry(&self, id: BlobId, size: u64) -> CacheResult<()> {
        let record = index::format_record(id, size, self.now());
        let path = self.index_path(id);

        let written: io::Result<()> = async {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&path)
                .await?;
            file.write_all(record.as_bytes()).await?;
            file.flush().await?;
            // Truncate only after writing, in case a prior record left the
            // file longer than one line.
            file.set_len(record.len() as u64).await?;
            Ok(())
        }
        .await;

        if let Err(e) = written {
            let _ = std::fs::remove_file(&path);
            return Err(e.into());
        }

        self.set_file_times(&path)?;
        Ok(())
    }
}
