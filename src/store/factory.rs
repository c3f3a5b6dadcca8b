//! Storage backend factory

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::postgres::PostgresPool;

use super::backend::StorageBackend;
use super::memory_backend::MemoryStorageBackend;
use super::postgres_backend::PostgresStorageBackend;

/// Create a storage backend based on configuration.
///
/// - `"postgres"` (default): `PostgresStorageBackend` when a pool is provided
/// - `"memory"`: `MemoryStorageBackend`, contents are lost on restart
///
/// ```rust,ignore
/// let backend = create_storage_backend(&settings.storage, Some(pg_pool.clone()));
/// ```
pub fn create_storage_backend(
    settings: &StorageConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn StorageBackend> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL storage backend");
                Arc::new(PostgresStorageBackend::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryStorageBackend::new())
            }
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory storage backend");
            Arc::new(MemoryStorageBackend::new())
        }
        other => {
            tracing::warn!(
                backend = other,
                "Unknown storage backend, falling back to memory"
            );
            Arc::new(MemoryStorageBackend::new())
        }
    }
}
