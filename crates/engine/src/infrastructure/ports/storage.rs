//! Blob storage port.

use async_trait::async_trait;

use super::error::RepoError;

/// Durable JSON blob storage addressed by `(namespace, key)`.
///
/// Implementations store opaque JSON text; typing happens in
/// [`crate::infrastructure::persisted_store::PersistedStore`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStorePort: Send + Sync {
    async fn load(&self, namespace: &str, key: &str) -> Result<Option<String>, RepoError>;
    async fn save(&self, namespace: &str, key: &str, json: &str) -> Result<(), RepoError>;
}
