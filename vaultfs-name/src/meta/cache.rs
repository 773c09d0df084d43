//! Write-through cache front
//!
//! Keeps the hot hash→record map and the storageId→hash reverse index in
//! memory so admission checks and download resolution rarely touch the
//! backend. Writes go backend-first; the cache is only filled once the
//! backend accepted the record.

use super::{MetaRecord, MetaStore};
use async_trait::async_trait;
use moka::sync::Cache;
use std::sync::Arc;
use vaultfs_common::Result;

pub struct CachedMetaStore {
    inner: Arc<dyn MetaStore>,
    by_hash: Cache<String, MetaRecord>,
    hash_by_id: Cache<String, String>,
}

impl CachedMetaStore {
    #[must_use]
    pub fn new(inner: Arc<dyn MetaStore>, max_size: u64) -> Self {
        Self {
            inner,
            by_hash: Cache::new(max_size),
            hash_by_id: Cache::new(max_size),
        }
    }

    fn fill(&self, record: &MetaRecord) {
        self.by_hash.insert(record.hash.clone(), record.clone());
        self.hash_by_id
            .insert(record.storage_id.clone(), record.hash.clone());
    }
}

#[async_trait]
impl MetaStore for CachedMetaStore {
    async fn query_by_hash(&self, hash: &str) -> Result<Option<MetaRecord>> {
        if let Some(record) = self.by_hash.get(hash) {
            return Ok(Some(record));
        }
        let record = self.inner.query_by_hash(hash).await?;
        if let Some(record) = &record {
            self.fill(record);
        }
        Ok(record)
    }

    async fn query_hash_by_storage_id(&self, storage_id: &str) -> Result<Option<String>> {
        if let Some(hash) = self.hash_by_id.get(storage_id) {
            return Ok(Some(hash));
        }
        let hash = self.inner.query_hash_by_storage_id(storage_id).await?;
        if let Some(hash) = &hash {
            self.hash_by_id.insert(storage_id.to_owned(), hash.clone());
        }
        Ok(hash)
    }

    async fn log_add_file(&self, record: &MetaRecord) -> Result<()> {
        self.inner.log_add_file(record).await?;
        self.fill(record);
        Ok(())
    }

    async fn try_acquire_upload_lock(&self, hash: &str, node_id: &str) -> Result<bool> {
        self.inner.try_acquire_upload_lock(hash, node_id).await
    }

    async fn release_upload_lock(&self, hash: &str) -> Result<()> {
        self.inner.release_upload_lock(hash).await
    }
}
