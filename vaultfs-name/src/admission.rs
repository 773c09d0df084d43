//! Pre-upload admission and commit
//!
//! Admission serializes writers per content hash. Decisions run under one
//! of 128 segment locks chosen by hash, so two requests for the same hash
//! can never interleave while unrelated hashes stay parallel. The only
//! I/O permitted under a segment lock is the metadata query and the
//! cluster-lock acquisition, both bounded to three seconds.

use crate::meta::{MetaRecord, MetaStore};
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use vaultfs_common::constants::{
    ADMISSION_SEGMENTS, CONNECT_TIMEOUT, PENDING_SWEEP_INTERVAL, PENDING_TTL,
};
use vaultfs_common::{epoch_ms, Result, StoreError};
use vaultfs_protocol::validate_hash;

/// Outcome of a `PRE_UPLOAD` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Content already committed; the client should skip the upload.
    Exist { location: String },
    /// Another writer holds the hash; retry after a back-off.
    Wait,
    /// This client is the single writer for the hash.
    Allow,
}

pub struct AdmissionController {
    meta: Arc<dyn MetaStore>,
    /// Hashes currently holding admission, with reservation time.
    pending: DashMap<String, Instant>,
    segments: [Mutex<()>; ADMISSION_SEGMENTS],
    /// Identifies this name service in the cluster lock table.
    node_id: String,
}

impl AdmissionController {
    #[must_use]
    pub fn new(meta: Arc<dyn MetaStore>, node_id: String) -> Self {
        Self {
            meta,
            pending: DashMap::new(),
            segments: [(); ADMISSION_SEGMENTS].map(|()| Mutex::new(())),
            node_id,
        }
    }

    fn segment(&self, hash: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        hash.hash(&mut hasher);
        &self.segments[(hasher.finish() as usize) % ADMISSION_SEGMENTS]
    }

    /// Bound a backend call so a slow database cannot pin a segment lock.
    async fn bounded<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(CONNECT_TIMEOUT, fut)
            .await
            .map_err(|_| StoreError::Timeout("metadata backend call timed out".into()))?
    }

    /// Admission decision for `PRE_UPLOAD(hash)`.
    pub async fn pre_upload(&self, hash: &str) -> Result<Admission> {
        validate_hash(hash).map_err(|e| StoreError::Validation(e.to_string()))?;
        let _guard = self.segment(hash).lock().await;

        if let Some(record) = Self::bounded(self.meta.query_by_hash(hash)).await? {
            return Ok(Admission::Exist {
                location: record.location,
            });
        }

        if !Self::bounded(self.meta.try_acquire_upload_lock(hash, &self.node_id)).await? {
            return Ok(Admission::Wait);
        }

        if self.pending.contains_key(hash) {
            // A local writer got here first; give the cluster lock back so
            // its commit path owns the row.
            if let Err(e) = Self::bounded(self.meta.release_upload_lock(hash)).await {
                warn!("Failed to release upload lock for {}: {}", hash, e);
            }
            return Ok(Admission::Wait);
        }

        self.pending.insert(hash.to_owned(), Instant::now());
        Ok(Admission::Allow)
    }

    /// Commit decision for `COMMIT_FILE(filename, hash, location)`.
    ///
    /// Idempotent: a hash already committed returns the existing storage
    /// id. Whatever happens, the hash leaves `pending` before this
    /// returns, and on persistence failure the cluster lock is released.
    pub async fn commit(&self, filename: &str, hash: &str, location: &str) -> Result<String> {
        validate_hash(hash).map_err(|e| StoreError::Validation(e.to_string()))?;
        let _guard = self.segment(hash).lock().await;

        if let Some(record) = Self::bounded(self.meta.query_by_hash(hash)).await? {
            self.pending.remove(hash);
            return Ok(record.storage_id);
        }

        self.pending.remove(hash);

        let record = MetaRecord {
            storage_id: Uuid::new_v4().to_string(),
            filename: filename.to_owned(),
            hash: hash.to_owned(),
            location: location.to_owned(),
            create_time: epoch_ms(),
        };
        if let Err(e) = self.meta.log_add_file(&record).await {
            if let Err(unlock_err) = Self::bounded(self.meta.release_upload_lock(hash)).await {
                warn!(
                    "Failed to release upload lock for {} after failed commit: {}",
                    hash, unlock_err
                );
            }
            return Err(e);
        }
        Ok(record.storage_id)
    }

    /// Resolve a storage id (or, legacy, a bare hash) to
    /// `(filename, hash, location)`.
    pub async fn resolve_download(&self, id: &str) -> Result<Option<(String, String, String)>> {
        let hash = match self.meta.query_hash_by_storage_id(id).await? {
            Some(hash) => hash,
            // Old clients pass the content hash where the storage id
            // belongs.
            None => id.to_owned(),
        };
        Ok(self
            .meta
            .query_by_hash(&hash)
            .await?
            .map(|record| (record.filename, record.hash, record.location)))
    }

    /// Drop reservations older than `ttl`; returns how many were dropped.
    pub fn sweep_pending(&self, ttl: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, reserved_at| reserved_at.elapsed() <= ttl);
        before - self.pending.len()
    }

    /// Spawn the periodic pending sweeper.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PENDING_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let dropped = controller.sweep_pending(PENDING_TTL);
                if dropped > 0 {
                    debug!("Expired {} stale admission reservation(s)", dropped);
                }
            }
        })
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
