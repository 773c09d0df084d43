//! On-disk blob store
//!
//! Layout: `<root>/<H[0:2]>/<H[2:4]>/<H>` for hash `H`. Reads probe the
//! configured roots in order; writes land on the root with the most free
//! space at ingest time. An upload is written to a per-connection temp file
//! `<H>.<uuid>.tmp` next to its final location and promoted by rename under
//! a process-wide lock.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use vaultfs_common::{Result, StoreError};
use vaultfs_protocol::validate_hash;

/// Result of promoting a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The temp file became the final file.
    Stored,
    /// The final file already existed; the temp was discarded.
    Deduplicated,
}

/// Multi-root hash-addressed store.
pub struct BlobStore {
    /// Canonicalized at open; every resolved path must stay inside one of
    /// these.
    roots: Vec<PathBuf>,
    /// Serializes the exists-check/rename step across all connections.
    file_lock: Mutex<()>,
}

impl BlobStore {
    /// Open the store, creating missing roots.
    pub fn open(roots: &[PathBuf]) -> Result<Self> {
        if roots.is_empty() {
            return Err(StoreError::Config("no storage roots configured".into()));
        }
        let mut canonical = Vec::with_capacity(roots.len());
        for root in roots {
            std::fs::create_dir_all(root)?;
            let canon = root.canonicalize()?;
            if !canon.is_dir() {
                return Err(StoreError::Config(format!(
                    "storage root {} is not a directory",
                    canon.display()
                )));
            }
            canonical.push(canon);
        }
        Ok(Self {
            roots: canonical,
            file_lock: Mutex::new(()),
        })
    }

    /// Hash-derived path relative to a root.
    fn shard(hash: &str) -> PathBuf {
        PathBuf::from(&hash[0..2]).join(&hash[2..4]).join(hash)
    }

    fn check_hash(hash: &str) -> Result<()> {
        validate_hash(hash).map_err(|e| StoreError::Validation(e.to_string()))?;
        // The two-level shard needs at least four characters.
        if hash.len() < 4 {
            return Err(StoreError::Validation("non-conformant hash".into()));
        }
        Ok(())
    }

    /// Find an existing blob; probes roots in configuration order.
    pub async fn locate(&self, hash: &str) -> Result<Option<(PathBuf, u64)>> {
        Self::check_hash(hash)?;
        for root in &self.roots {
            let path = root.join(Self::shard(hash));
            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {
                    self.assert_contained(&path)?;
                    return Ok(Some((path, meta.len())));
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Total free space across roots, for heartbeats and placement.
    #[must_use]
    pub fn free_space(&self) -> i64 {
        self.roots
            .iter()
            .map(|root| fs2::available_space(root).unwrap_or(0))
            .sum::<u64>()
            .min(i64::MAX as u64) as i64
    }

    /// Root with the most free space at this moment.
    fn choose_root(&self) -> &Path {
        self.roots
            .iter()
            .max_by_key(|root| fs2::available_space(root).unwrap_or(0))
            .map_or_else(|| self.roots[0].as_path(), PathBuf::as_path)
    }

    /// Canonical-descendant hardening: a resolved path must live under a
    /// configured root. The alphanumeric hash check already rules out
    /// traversal; this is the backstop behind it.
    fn assert_contained(&self, path: &Path) -> Result<()> {
        let canon = path
            .canonicalize()
            .map_err(|e| StoreError::Validation(format!("cannot canonicalize path: {e}")))?;
        if self.roots.iter().any(|root| canon.starts_with(root)) {
            Ok(())
        } else {
            Err(StoreError::Validation(
                "resolved path escapes storage roots".into(),
            ))
        }
    }

    /// Open a unique temp file for an incoming upload of `hash`.
    pub async fn begin_upload(&self, hash: &str, expected: u64) -> Result<TempUpload> {
        Self::check_hash(hash)?;
        let root = self.choose_root();
        let final_dir = root.join(&hash[0..2]).join(&hash[2..4]);
        fs::create_dir_all(&final_dir).await?;
        self.assert_contained(&final_dir)?;

        // Unique per connection; two uploads of the same hash never share
        // a temp file.
        let temp_path = final_dir.join(format!("{hash}.{}.tmp", Uuid::new_v4()));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;

        Ok(TempUpload {
            hash: hash.to_owned(),
            final_path: final_dir.join(hash),
            temp_path,
            file: Some(file),
            received: 0,
            expected,
        })
    }

    /// Promote a fully received upload.
    ///
    /// The exists-check and rename run under the process-wide file lock so
    /// concurrent uploads of the same hash cannot interleave between them.
    pub async fn finalize(&self, mut upload: TempUpload) -> Result<IngestOutcome> {
        debug_assert!(upload.is_complete());
        if let Some(mut file) = upload.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        let _guard = self.file_lock.lock().await;
        if fs::try_exists(&upload.final_path).await? {
            fs::remove_file(&upload.temp_path).await?;
            return Ok(IngestOutcome::Deduplicated);
        }
        match fs::rename(&upload.temp_path, &upload.final_path).await {
            Ok(()) => Ok(IngestOutcome::Stored),
            Err(rename_err) => {
                let winner_exists = fs::try_exists(&upload.final_path).await.unwrap_or(false);
                if let Err(e) = fs::remove_file(&upload.temp_path).await {
                    warn!("Failed to remove temp {}: {}", upload.temp_path.display(), e);
                }
                if winner_exists {
                    // Lost a rename race; content is identical by hash.
                    Ok(IngestOutcome::Deduplicated)
                } else {
                    Err(rename_err.into())
                }
            }
        }
    }

    /// Remove `.tmp` files older than `max_age` under every root.
    pub async fn gc_sweep(&self, max_age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        for root in &self.roots {
            removed += sweep_dir(root, 0, cutoff).await?;
        }
        Ok(removed)
    }
}

/// Walk the two shard levels below a root and reap stale temp files.
async fn sweep_dir(dir: &Path, depth: usize, cutoff: SystemTime) -> Result<usize> {
    let mut removed = 0;
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;
        if file_type.is_dir() && depth < 2 {
            removed += Box::pin(sweep_dir(&path, depth + 1, cutoff)).await?;
        } else if file_type.is_file()
            && path.extension().is_some_and(|ext| ext == "tmp")
        {
            let meta = entry.metadata().await?;
            let stale = meta.modified().map(|mtime| mtime < cutoff).unwrap_or(false);
            if stale {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!("GC removed stale temp {}", path.display());
                        removed += 1;
                    }
                    // Raced with an uploader finishing; nothing to do.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("GC failed to remove {}: {}", path.display(), e),
                }
            }
        }
    }
    Ok(removed)
}

/// An in-flight upload bound to one connection.
pub struct TempUpload {
    pub hash: String,
    final_path: PathBuf,
    temp_path: PathBuf,
    file: Option<tokio::fs::File>,
    received: u64,
    expected: u64,
}

impl TempUpload {
    /// Append a stream chunk.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StoreError::Protocol("write after finalize".into()))?;
        file.write_all(chunk).await?;
        self.received += chunk.len() as u64;
        Ok(())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received >= self.expected
    }

    #[must_use]
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Drop the temp file; used when the peer disconnects mid-stream.
    pub async fn abort(mut self) {
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove aborted temp {}: {}",
                    self.temp_path.display(),
                    e
                );
            }
        }
    }
}
