//! Append-only file backend
//!
//! One UTF-8 line per record, pipe-delimited, no escaping:
//! `ADD|filename|hash|location|storageId`. The whole log is replayed into
//! memory at startup; queries never touch the disk. Each append opens,
//! writes, syncs and closes the file under a mutex, so a crash loses at
//! most the record being written.

use super::{MetaRecord, MetaStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use vaultfs_common::{epoch_ms, Result, StoreError};

pub struct FileMetaLog {
    path: PathBuf,
    append_lock: Mutex<()>,
    by_hash: DashMap<String, MetaRecord>,
    hash_by_id: DashMap<String, String>,
}

impl FileMetaLog {
    /// Open the log, replaying any existing records.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let log = Self {
            path: path.to_path_buf(),
            append_lock: Mutex::new(()),
            by_hash: DashMap::new(),
            hash_by_id: DashMap::new(),
        };
        log.replay().await?;
        Ok(log)
    }

    async fn replay(&self) -> Result<()> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut replayed = 0usize;
        for line in raw.lines() {
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(record) => {
                    self.index(record);
                    replayed += 1;
                }
                None => warn!("Skipping malformed metadata line: {line:?}"),
            }
        }
        if replayed > 0 {
            info!(
                "Replayed {} metadata record(s) from {}",
                replayed,
                self.path.display()
            );
        }
        Ok(())
    }

    fn index(&self, record: MetaRecord) {
        self.hash_by_id
            .insert(record.storage_id.clone(), record.hash.clone());
        // First record for a hash wins; later commits of the same content
        // add storage ids but do not change the canonical location.
        self.by_hash.entry(record.hash.clone()).or_insert(record);
    }
}

fn parse_line(line: &str) -> Option<MetaRecord> {
    let mut fields = line.split('|');
    if fields.next()? != "ADD" {
        return None;
    }
    let filename = fields.next()?;
    let hash = fields.next()?;
    let location = fields.next()?;
    let storage_id = fields.next()?;
    if fields.next().is_some() || storage_id.is_empty() || hash.is_empty() {
        return None;
    }
    Some(MetaRecord {
        storage_id: storage_id.to_owned(),
        filename: filename.to_owned(),
        hash: hash.to_owned(),
        location: location.to_owned(),
        create_time: epoch_ms(),
    })
}

#[async_trait]
impl MetaStore for FileMetaLog {
    async fn query_by_hash(&self, hash: &str) -> Result<Option<MetaRecord>> {
        Ok(self.by_hash.get(hash).map(|r| r.clone()))
    }

    async fn query_hash_by_storage_id(&self, storage_id: &str) -> Result<Option<String>> {
        Ok(self.hash_by_id.get(storage_id).map(|h| h.clone()))
    }

    async fn log_add_file(&self, record: &MetaRecord) -> Result<()> {
        record.validate()?;
        let line = format!(
            "ADD|{}|{}|{}|{}\n",
            record.filename, record.hash, record.location, record.storage_id
        );
        {
            let _guard = self.append_lock.lock().await;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
            file.flush()
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
            file.sync_all()
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        self.index(record.clone());
        Ok(())
    }

    async fn try_acquire_upload_lock(&self, _hash: &str, _node_id: &str) -> Result<bool> {
        // Single-process backend; the in-memory pending set is the only
        // writer gate needed.
        Ok(true)
    }

    async fn release_upload_lock(&self, _hash: &str) -> Result<()> {
        Ok(())
    }
}
