//! Blob storage backends: SQLite for real runs, memory for tests.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::infrastructure::ports::{BlobStorePort, ClockPort, RepoError};

/// SQLite implementation of namespaced JSON blob storage.
pub struct SqliteBlobStore {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteBlobStore {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("blob_store", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("blob_store", e))?;

        Ok(Self { pool, clock })
    }
}

#[async_trait]
impl BlobStorePort for SqliteBlobStore {
    async fn load(&self, namespace: &str, key: &str) -> Result<Option<String>, RepoError> {
        let row = sqlx::query("SELECT json FROM blobs WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("blob_load", e))?;

        Ok(row.map(|row| row.get::<String, _>("json")))
    }

    async fn save(&self, namespace: &str, key: &str, json: &str) -> Result<(), RepoError> {
        let now = self.clock.now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO blobs (namespace, key, json, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                json = excluded.json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("blob_save", e))?;

        Ok(())
    }
}

/// In-memory blob storage. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<(String, String), String>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStorePort for InMemoryBlobStore {
    async fn load(&self, namespace: &str, key: &str) -> Result<Option<String>, RepoError> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn save(&self, namespace: &str, key: &str, json: &str) -> Result<(), RepoError> {
        self.blobs
            .write()
            .await
            .insert((namespace.to_string(), key.to_string()), json.to_string());
        Ok(())
    }
}
