//! Backend trait for template and delivery log persistence.
//!
//! This module defines the abstraction layer for storage backends,
//! allowing different implementations (memory, PostgreSQL) to be
//! used interchangeably.

use async_trait::async_trait;
use thiserror::Error;

use super::filter::{DeliveryAttemptFilter, EmailFilter, FolderFilter};
use super::patch::{EmailChange, FolderChange};
use super::types::{DeliveryAttempt, Email, Folder, NewDeliveryAttempt, NewEmail, NewFolder};

/// Errors that can occur during storage backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique key (folder parent + name) would be duplicated
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A parent or containing folder id points at no folder
    #[error("Referenced folder does not exist: {0}")]
    MissingFolder(String),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Stored data could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Persistence collaborator for folders, templates and delivery attempts.
///
/// Update and delete return the number of affected rows so callers can
/// tell "not found" apart from success.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// across request handlers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend identifier for logs and health output.
    fn backend_type(&self) -> &'static str;

    async fn insert_folder(&self, folder: NewFolder) -> Result<Folder, StorageError>;

    /// Folders matching the filter, ordered by id.
    async fn find_folders(&self, filter: &FolderFilter) -> Result<Vec<Folder>, StorageError>;

    async fn update_folder(&self, id: i64, changes: &[FolderChange]) -> Result<u64, StorageError>;

    /// Delete a folder together with its descendant folders and their templates.
    async fn delete_folder(&self, id: i64) -> Result<u64, StorageError>;

    async fn insert_email(&self, email: NewEmail) -> Result<Email, StorageError>;

    /// Templates matching the filter, ordered by id.
    async fn find_emails(&self, filter: &EmailFilter) -> Result<Vec<Email>, StorageError>;

    async fn update_email(&self, id: i64, changes: &[EmailChange]) -> Result<u64, StorageError>;

    async fn delete_email(&self, id: i64) -> Result<u64, StorageError>;

    async fn insert_delivery_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, StorageError>;

    /// Delivery attempts matching the filter, ordered by id.
    async fn find_delivery_attempts(
        &self,
        filter: &DeliveryAttemptFilter,
    ) -> Result<Vec<DeliveryAttempt>, StorageError>;
}
