//! Metadata store
//!
//! One capability set, two backends. The file backend is an append-only
//! log replayed into memory at startup, suitable for a single name
//! service. The MySQL backend carries the cluster-wide upload lock and is
//! the one to use when several name services share the namespace.

mod cache;
mod file;
mod mysql;

pub use cache::CachedMetaStore;
pub use file::FileMetaLog;
pub use mysql::MySqlMetaStore;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use vaultfs_common::{MetadataConfig, MetadataMode, Result, StoreError};

/// One committed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    /// UUID handed back to the client at commit.
    pub storage_id: String,
    /// Original filename at commit time.
    pub filename: String,
    /// SHA-256 of the plaintext, 64 lowercase hex chars.
    pub hash: String,
    /// `host:port` of the data service holding the blob.
    pub location: String,
    /// Epoch-ms of the commit.
    pub create_time: i64,
}

impl MetaRecord {
    /// Reject field values that would corrupt the pipe-delimited log or
    /// the wire replies.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("filename", &self.filename),
            ("hash", &self.hash),
            ("location", &self.location),
            ("storage id", &self.storage_id),
        ] {
            if value.is_empty() {
                return Err(StoreError::Validation(format!("empty {name}")));
            }
            if value.contains('|') || value.contains('\n') {
                return Err(StoreError::Validation(format!(
                    "{name} must not contain '|' or newline"
                )));
            }
        }
        Ok(())
    }
}

/// Capability set shared by every backend.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// First record known for a hash, if any.
    async fn query_by_hash(&self, hash: &str) -> Result<Option<MetaRecord>>;

    /// Reverse lookup used by download resolution.
    async fn query_hash_by_storage_id(&self, storage_id: &str) -> Result<Option<String>>;

    /// Durably record a commit. Visible to `query_by_hash` once this
    /// returns.
    async fn log_add_file(&self, record: &MetaRecord) -> Result<()>;

    /// Cluster-wide single-writer gate for a hash. `true` means this node
    /// holds the lock.
    async fn try_acquire_upload_lock(&self, hash: &str, node_id: &str) -> Result<bool>;

    /// Drop the cluster lock after a failed upload.
    async fn release_upload_lock(&self, hash: &str) -> Result<()>;
}

/// Build the configured backend, fronted by the cache unless disabled.
pub async fn build(config: &MetadataConfig) -> Result<Arc<dyn MetaStore>> {
    let backend: Arc<dyn MetaStore> = match config.mode {
        MetadataMode::File => Arc::new(FileMetaLog::open(&config.file.path).await?),
        MetadataMode::Mysql => Arc::new(MySqlMetaStore::connect(&config.mysql).await?),
    };
    if !config.cache.enabled {
        return Ok(backend);
    }
    if config.cache.write_policy != "write-through" {
        warn!(
            "Unsupported cache write-policy {:?}; behaving as write-through",
            config.cache.write_policy
        );
    }
    Ok(Arc::new(CachedMetaStore::new(backend, config.cache.max_size)))
}
