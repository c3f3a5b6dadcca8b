//! Folder and template operations on top of a storage backend.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use super::backend::{StorageBackend, StorageError};
use super::filter::{EmailFilter, FolderFilter, NullableSet};
use super::patch::{EmailPatch, FolderPatch};
use super::types::{Email, Folder, NewEmail, NewFolder};

/// Template store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Folder {name:?} already exists under parent {parent_id:?}")]
    FolderExists {
        parent_id: Option<i64>,
        name: String,
    },

    #[error("Folder not found: {0}")]
    FolderNotFound(i64),

    #[error("Email not found: {0}")]
    EmailNotFound(i64),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for template store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Folder tree and email template store.
///
/// Owns the `(parent_id, name)` uniqueness rule for folders and the
/// "affected rows = 0 means not found" rule for updates and deletes.
#[derive(Clone)]
pub struct TemplateStore {
    backend: Arc<dyn StorageBackend>,
}

impl TemplateStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Create a folder unless one with the same parent and name exists.
    #[tracing::instrument(
        name = "store.create_folder",
        skip(self, folder),
        fields(parent_id = ?folder.parent_id)
    )]
    pub async fn create_folder(&self, folder: NewFolder) -> StoreResult<Folder> {
        let same_pair = FolderFilter {
            parent_id_in: Some(match folder.parent_id {
                Some(parent_id) => NullableSet::of(vec![parent_id]),
                None => NullableSet::only_null(),
            }),
            name_in: Some(vec![folder.name.clone()]),
            ..Default::default()
        };

        if !self.backend.find_folders(&same_pair).await?.is_empty() {
            tracing::debug!(name = %folder.name, "Folder already exists");
            return Err(StoreError::FolderExists {
                parent_id: folder.parent_id,
                name: folder.name,
            });
        }

        let parent_id = folder.parent_id;
        let name = folder.name.clone();

        // A concurrent create can pass the lookup; the backend's unique key decides.
        let created = self
            .backend
            .insert_folder(folder)
            .await
            .map_err(|e| match e {
                StorageError::UniqueViolation(_) => StoreError::FolderExists { parent_id, name },
                other => missing_folder(other, parent_id),
            })?;

        tracing::info!(folder_id = created.id, "Folder created");
        Ok(created)
    }

    pub async fn filter_folders(&self, filter: &FolderFilter) -> StoreResult<Vec<Folder>> {
        Ok(self.backend.find_folders(filter).await?)
    }

    /// Apply the fields set in `patch` and stamp `updated`.
    #[tracing::instrument(name = "store.update_folder", skip(self, patch))]
    pub async fn update_folder(&self, id: i64, patch: FolderPatch) -> StoreResult<()> {
        let parent_id = patch.parent_id.as_set().copied();
        let name = patch.name.as_set().cloned();
        let changes = patch.into_changes(Utc::now());

        let affected = match self.backend.update_folder(id, &changes).await {
            Ok(affected) => affected,
            Err(StorageError::UniqueViolation(_)) => {
                return Err(self.folder_collision(id, parent_id, name).await);
            }
            Err(other) => return Err(missing_folder(other, parent_id.flatten())),
        };

        if affected == 0 {
            return Err(StoreError::FolderNotFound(id));
        }

        tracing::info!(folder_id = id, fields = changes.len() - 1, "Folder updated");
        Ok(())
    }

    /// `FolderExists` for the key a patch collided on. Fields the patch left
    /// unset are read back from the stored folder.
    async fn folder_collision(
        &self,
        id: i64,
        parent_id: Option<Option<i64>>,
        name: Option<String>,
    ) -> StoreError {
        let current = match (parent_id, &name) {
            (Some(_), Some(_)) => None,
            _ => {
                let filter = FolderFilter {
                    id_in: Some(vec![id]),
                    ..Default::default()
                };
                match self.backend.find_folders(&filter).await {
                    Ok(found) => found.into_iter().next(),
                    Err(e) => return e.into(),
                }
            }
        };

        StoreError::FolderExists {
            parent_id: parent_id.unwrap_or_else(|| current.as_ref().and_then(|f| f.parent_id)),
            name: name
                .or_else(|| current.map(|f| f.name))
                .unwrap_or_default(),
        }
    }

    /// Delete a folder; descendants and their templates go with it.
    #[tracing::instrument(name = "store.delete_folder", skip(self))]
    pub async fn delete_folder(&self, id: i64) -> StoreResult<()> {
        if self.backend.delete_folder(id).await? == 0 {
            return Err(StoreError::FolderNotFound(id));
        }
        tracing::info!(folder_id = id, "Folder deleted");
        Ok(())
    }

    #[tracing::instrument(
        name = "store.create_email",
        skip(self, email),
        fields(folder_id = ?email.folder_id)
    )]
    pub async fn create_email(&self, email: NewEmail) -> StoreResult<Email> {
        let folder_id = email.folder_id;
        let created = self
            .backend
            .insert_email(email)
            .await
            .map_err(|e| missing_folder(e, folder_id))?;
        tracing::info!(email_id = created.id, "Email template created");
        Ok(created)
    }

    pub async fn filter_emails(&self, filter: &EmailFilter) -> StoreResult<Vec<Email>> {
        Ok(self.backend.find_emails(filter).await?)
    }

    /// Apply the fields set in `patch` and stamp `updated`.
    #[tracing::instrument(name = "store.update_email", skip(self, patch))]
    pub async fn update_email(&self, id: i64, patch: EmailPatch) -> StoreResult<()> {
        let folder_id = patch.folder_id.as_set().copied().flatten();
        let changes = patch.into_changes(Utc::now());
        let affected = self
            .backend
            .update_email(id, &changes)
            .await
            .map_err(|e| missing_folder(e, folder_id))?;
        if affected == 0 {
            return Err(StoreError::EmailNotFound(id));
        }
        tracing::info!(email_id = id, fields = changes.len() - 1, "Email template updated");
        Ok(())
    }

    #[tracing::instrument(name = "store.delete_email", skip(self))]
    pub async fn delete_email(&self, id: i64) -> StoreResult<()> {
        if self.backend.delete_email(id).await? == 0 {
            return Err(StoreError::EmailNotFound(id));
        }
        tracing::info!(email_id = id, "Email template deleted");
        Ok(())
    }
}

/// A write that referenced an unknown folder surfaces as `FolderNotFound`.
fn missing_folder(err: StorageError, folder_id: Option<i64>) -> StoreError {
    match (err, folder_id) {
        (StorageError::MissingFolder(_), Some(id)) => StoreError::FolderNotFound(id),
        (other, _) => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory_backend::MemoryStorageBackend;
    use crate::store::patch::Patch;

    fn store() -> TemplateStore {
        TemplateStore::new(Arc::new(MemoryStorageBackend::new()))
    }

    fn folder(parent_id: Option<i64>, name: &str) -> NewFolder {
        NewFolder {
            parent_id,
            name: name.to_string(),
            description: "desc".to_string(),
            system_flag: false,
        }
    }

    fn email(folder_id: Option<i64>, subject: &str) -> NewEmail {
        NewEmail {
            folder_id,
            from_email: "noreply@example.com".to_string(),
            from_name: "Example".to_string(),
            subject: subject.to_string(),
            html: "<p>{{name}}</p>".to_string(),
            text: "{{name}}".to_string(),
            description: String::new(),
            system_flag: false,
        }
    }

    #[tokio::test]
    async fn test_create_duplicate_folder_is_rejected_without_write() {
        let store = store();
        store.create_folder(folder(None, "Billing")).await.unwrap();

        let result = store.create_folder(folder(None, "Billing")).await;
        assert!(matches!(
            result,
            Err(StoreError::FolderExists { parent_id: None, ref name }) if name == "Billing"
        ));

        let all = store.filter_folders(&FolderFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_same_name_under_other_parent_is_allowed() {
        let store = store();
        let parent = store.create_folder(folder(None, "Parent")).await.unwrap();
        store.create_folder(folder(None, "Shared")).await.unwrap();
        let nested = store.create_folder(folder(Some(parent.id), "Shared")).await.unwrap();
        assert_eq!(nested.parent_id, Some(parent.id));
    }

    #[tokio::test]
    async fn test_filter_by_null_or_parent() {
        let store = store();
        let five = store.create_folder(folder(None, "five")).await.unwrap();
        let other = store.create_folder(folder(None, "other")).await.unwrap();
        let under_five = store.create_folder(folder(Some(five.id), "a")).await.unwrap();
        store.create_folder(folder(Some(other.id), "b")).await.unwrap();

        let filter = FolderFilter {
            parent_id_in: Some(NullableSet::of(vec![five.id]).with_null()),
            ..Default::default()
        };
        let ids: Vec<i64> = store
            .filter_folders(&filter)
            .await
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![five.id, other.id, under_five.id]);
    }

    #[tokio::test]
    async fn test_update_missing_folder_is_not_found() {
        let store = store();
        let existing = store.create_folder(folder(None, "Keep")).await.unwrap();

        let patch = FolderPatch {
            name: Patch::Set("Renamed".to_string()),
            ..Default::default()
        };
        let result = store.update_folder(existing.id + 100, patch).await;
        assert!(matches!(result, Err(StoreError::FolderNotFound(_))));

        let unchanged = store.filter_folders(&FolderFilter::default()).await.unwrap();
        assert_eq!(unchanged, vec![existing]);
    }

    #[tokio::test]
    async fn test_update_only_touches_set_fields() {
        let store = store();
        let created = store.create_folder(folder(None, "Original")).await.unwrap();

        let patch = FolderPatch {
            description: Patch::Set("changed".to_string()),
            ..Default::default()
        };
        store.update_folder(created.id, patch).await.unwrap();

        let updated = store
            .filter_folders(&FolderFilter {
                id_in: Some(vec![created.id]),
                ..Default::default()
            })
            .await
            .unwrap()
            .remove(0);
        assert_eq!(updated.name, "Original");
        assert_eq!(updated.description, "changed");
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_move_folder_to_root() {
        let store = store();
        let parent = store.create_folder(folder(None, "Parent")).await.unwrap();
        let child = store.create_folder(folder(Some(parent.id), "Child")).await.unwrap();

        let patch = FolderPatch {
            parent_id: Patch::Set(None),
            ..Default::default()
        };
        store.update_folder(child.id, patch).await.unwrap();

        let roots = store
            .filter_folders(&FolderFilter {
                parent_id_in: Some(NullableSet::only_null()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[tokio::test]
    async fn test_collision_reports_stored_key_for_partial_patch() {
        let store = store();
        let parent = store.create_folder(folder(None, "Parent")).await.unwrap();
        store.create_folder(folder(Some(parent.id), "Reports")).await.unwrap();
        let loose = store.create_folder(folder(None, "Reports")).await.unwrap();

        let move_only = FolderPatch {
            parent_id: Patch::Set(Some(parent.id)),
            ..Default::default()
        };
        let result = store.update_folder(loose.id, move_only).await;
        assert!(matches!(
            result,
            Err(StoreError::FolderExists { parent_id: Some(p), ref name })
                if p == parent.id && name == "Reports"
        ));

        let nested = store.create_folder(folder(Some(parent.id), "Drafts")).await.unwrap();
        let rename_only = FolderPatch {
            name: Patch::Set("Reports".to_string()),
            ..Default::default()
        };
        let result = store.update_folder(nested.id, rename_only).await;
        assert!(matches!(
            result,
            Err(StoreError::FolderExists { parent_id: Some(p), ref name })
                if p == parent.id && name == "Reports"
        ));
    }

    #[tokio::test]
    async fn test_unknown_folder_reference_is_not_found() {
        let store = store();
        assert!(matches!(
            store.create_folder(folder(Some(404), "Orphan")).await,
            Err(StoreError::FolderNotFound(404))
        ));
        assert!(matches!(
            store.create_email(email(Some(404), "Orphan")).await,
            Err(StoreError::FolderNotFound(404))
        ));

        let existing = store.create_folder(folder(None, "Home")).await.unwrap();
        let template = store.create_email(email(Some(existing.id), "Kept")).await.unwrap();

        let move_folder = FolderPatch {
            parent_id: Patch::Set(Some(404)),
            ..Default::default()
        };
        assert!(matches!(
            store.update_folder(existing.id, move_folder).await,
            Err(StoreError::FolderNotFound(404))
        ));
        let move_email = EmailPatch {
            folder_id: Patch::Set(Some(404)),
            ..Default::default()
        };
        assert!(matches!(
            store.update_email(template.id, move_email).await,
            Err(StoreError::FolderNotFound(404))
        ));

        let found = store.filter_emails(&EmailFilter::by_id(template.id)).await.unwrap();
        assert_eq!(found[0].folder_id, Some(existing.id));
    }

    #[tokio::test]
    async fn test_delete_folder_cascades() {
        let store = store();
        let root = store.create_folder(folder(None, "Root")).await.unwrap();
        let child = store.create_folder(folder(Some(root.id), "Child")).await.unwrap();
        store.create_email(email(Some(child.id), "nested")).await.unwrap();
        let loose = store.create_email(email(None, "loose")).await.unwrap();

        store.delete_folder(root.id).await.unwrap();

        assert!(store
            .filter_folders(&FolderFilter::default())
            .await
            .unwrap()
            .is_empty());
        let remaining = store.filter_emails(&EmailFilter::default()).await.unwrap();
        assert_eq!(remaining, vec![loose]);

        assert!(matches!(
            store.delete_folder(root.id).await,
            Err(StoreError::FolderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_email_crud() {
        let store = store();
        let created = store.create_email(email(None, "Hello")).await.unwrap();
        // Templates may share subjects freely
        store.create_email(email(None, "Hello")).await.unwrap();

        let patch = EmailPatch {
            subject: Patch::Set("Updated".to_string()),
            ..Default::default()
        };
        store.update_email(created.id, patch).await.unwrap();

        let found = store
            .filter_emails(&EmailFilter::by_id(created.id))
            .await
            .unwrap();
        assert_eq!(found[0].subject, "Updated");
        assert_eq!(found[0].html, created.html);

        store.delete_email(created.id).await.unwrap();
        assert!(matches!(
            store.delete_email(created.id).await,
            Err(StoreError::EmailNotFound(_))
        ));
        assert!(matches!(
            store.update_email(created.id, EmailPatch::default()).await,
            Err(StoreError::EmailNotFound(_))
        ));
    }
}
