use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::error::CacheResult;
use crate::{MTIME_INTERVAL, TRIM_LIMIT};

/// Floor for the halving loop. Once the window shrinks below this the trim
/// gives up on the size bound rather than looping on timestamp granularity.
const TRIM_AGE_FLOOR: Duration = Duration::from_secs(1);

impl Cache {
    /// Remove cache entries that are unlikely to be reused.
    ///
    /// Entries whose data or index file mtime is older than
    /// [`TRIM_LIMIT`] (plus [`MTIME_INTERVAL`] of slack for the hysteresis
    /// imprecision of last-used mtimes) are always removed. When
    /// `max_bytes` is non-zero the age window keeps halving until the cache
    /// fits, or the window drops below one second.
    ///
    /// Trim runs without mutual exclusion against readers and writers:
    /// every deletion is a plain unlink, so a concurrent reader holding an
    /// open handle is unaffected and the worst outcome is a subsequent
    /// lookup reporting a miss.
    pub async fn trim(&self, max_bytes: u64) -> CacheResult<()> {
        let mut max_age = TRIM_LIMIT;
        let now = self.now();

        loop {
            info!(max_age_secs = max_age.as_secs(), "trimming cache");

            let cutoff = now
                .checked_sub(max_age + MTIME_INTERVAL)
                .unwrap_or(UNIX_EPOCH);
            for bucket in 0..256u32 {
                let subdir = self.bucket_dir(bucket);
                if let Err(e) = trim_subdir(&subdir, cutoff).await {
                    warn!(subdir = %subdir.display(), error = %e, "failed to trim subdirectory");
                }
            }

            if max_bytes == 0 {
                return Ok(());
            }

            let size = self.size().await?;
            info!(size, "trimmed cache size");
            if size <= max_bytes {
                return Ok(());
            }

            max_age /= 2;
            if max_age < TRIM_AGE_FLOOR {
                warn!(size, max_bytes, "cache still over budget at minimum trim age");
                return Ok(());
            }
        }
    }
}

/// Sweep one bucket, unlinking entry files older than `cutoff`.
async fn trim_subdir(subdir: &Path, cutoff: SystemTime) -> std::io::Result<()> {
    // Collect names before deleting anything so removal cannot disturb the
    // directory iteration.
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(subdir).await?;
    while let Some(dirent) = entries.next_entry().await? {
        names.push(dirent.file_name());
    }

    for name in names {
        let text = name.to_string_lossy();
        if !text.ends_with("-a") && !text.ends_with("-d") {
            continue;
        }
        let path = subdir.join(&name);
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };
        let Ok(mtime) = meta.modified() else {
            continue;
        };
        if mtime < cutoff {
            debug!(entry = %path.display(), "removing old cache entry");
            let _ = std::fs::remove_file(&path);
        }
    }

    Ok(())
}
