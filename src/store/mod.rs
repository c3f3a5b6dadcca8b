//! Folder tree, email templates and the delivery log.
//!
//! Persistence goes through the [`StorageBackend`] trait so the same
//! [`TemplateStore`] rules apply to the in-memory and PostgreSQL backends.

pub mod backend;
pub mod factory;
pub mod filter;
pub mod memory_backend;
pub mod patch;
pub mod postgres_backend;
pub mod template_store;
pub mod types;

pub use backend::{StorageBackend, StorageError};
pub use factory::create_storage_backend;
pub use filter::{DeliveryAttemptFilter, EmailFilter, FolderFilter, NullableSet};
pub use memory_backend::MemoryStorageBackend;
pub use patch::{EmailChange, EmailPatch, FolderChange, FolderPatch, Patch};
pub use postgres_backend::PostgresStorageBackend;
pub use template_store::{StoreError, StoreResult, TemplateStore};
pub use types::{
    DeliveryAttempt, DeliveryStatus, Email, Folder, NewDeliveryAttempt, NewEmail, NewFolder,
};
