//! MySQL backend
//!
//! Shared by every name service in a cluster. The upload lock table is the
//! cluster-wide single-writer gate; rows carry an expiry so a crashed
//! holder cannot block a hash forever.

use super::{MetaRecord, MetaStore};
use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;
use vaultfs_common::constants::UPLOAD_LOCK_TTL;
use vaultfs_common::{epoch_ms, MysqlConfig, Result, StoreError};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS file_metadata (
        storage_id  CHAR(36)     NOT NULL PRIMARY KEY,
        filename    VARCHAR(512) NOT NULL,
        file_hash   CHAR(64)     NOT NULL,
        create_time BIGINT       NOT NULL,
        INDEX idx_file_hash (file_hash)
    )",
    "CREATE TABLE IF NOT EXISTS file_location (
        id        BIGINT       NOT NULL AUTO_INCREMENT PRIMARY KEY,
        file_hash CHAR(64)     NOT NULL,
        address   VARCHAR(255) NOT NULL,
        UNIQUE KEY uq_hash_address (file_hash, address)
    )",
    "CREATE TABLE IF NOT EXISTS file_upload_lock (
        file_hash   CHAR(64)     NOT NULL PRIMARY KEY,
        node_id     VARCHAR(255) NOT NULL,
        expire_time BIGINT       NOT NULL
    )",
];

pub struct MySqlMetaStore {
    pool: MySqlPool,
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Persistence(e.to_string())
}

impl MySqlMetaStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(config: &MysqlConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.url())
            .await
            .map_err(db_err)?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(db_err)?;
        }
        info!(
            "Connected to metadata database {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(Self { pool })
    }

    fn row_to_record(row: &MySqlRow) -> MetaRecord {
        MetaRecord {
            storage_id: row.get("storage_id"),
            filename: row.get("filename"),
            hash: row.get("file_hash"),
            location: row.get("address"),
            create_time: row.get("create_time"),
        }
    }
}

#[async_trait]
impl MetaStore for MySqlMetaStore {
    async fn query_by_hash(&self, hash: &str) -> Result<Option<MetaRecord>> {
        let row = sqlx::query(
            "SELECT m.storage_id, m.filename, m.file_hash, m.create_time, l.address
             FROM file_metadata m
             JOIN file_location l ON l.file_hash = m.file_hash
             WHERE m.file_hash = ?
             ORDER BY m.create_time
             LIMIT 1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(Self::row_to_record))
    }

    async fn query_hash_by_storage_id(&self, storage_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT file_hash FROM file_metadata WHERE storage_id = ?")
            .bind(storage_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get("file_hash")))
    }

    async fn log_add_file(&self, record: &MetaRecord) -> Result<()> {
        record.validate()?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO file_metadata (storage_id, filename, file_hash, create_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&record.storage_id)
        .bind(&record.filename)
        .bind(&record.hash)
        .bind(record.create_time)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query("INSERT IGNORE INTO file_location (file_hash, address) VALUES (?, ?)")
            .bind(&record.hash)
            .bind(&record.location)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM file_upload_lock WHERE file_hash = ?")
            .bind(&record.hash)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }

    async fn try_acquire_upload_lock(&self, hash: &str, node_id: &str) -> Result<bool> {
        let now = epoch_ms();
        // Purge an expired holder first so a crashed node cannot wedge the
        // hash past the TTL.
        sqlx::query("DELETE FROM file_upload_lock WHERE file_hash = ? AND expire_time < ?")
            .bind(hash)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let expire_time = now + UPLOAD_LOCK_TTL.as_millis() as i64;
        let inserted = sqlx::query(
            "INSERT INTO file_upload_lock (file_hash, node_id, expire_time) VALUES (?, ?, ?)",
        )
        .bind(hash)
        .bind(node_id)
        .bind(expire_time)
        .execute(&self.pool)
        .await;
        match inserted {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn release_upload_lock(&self, hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM file_upload_lock WHERE file_hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
