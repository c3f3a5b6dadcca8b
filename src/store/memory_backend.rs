//! In-memory storage backend using DashMap.
//!
//! This module provides a memory-based implementation of the `StorageBackend` trait.
//! Data is lost on service restart; it backs tests and local development.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::backend::{StorageBackend, StorageError};
use super::filter::{DeliveryAttemptFilter, EmailFilter, FolderFilter};
use super::patch::{EmailChange, FolderChange};
use super::types::{DeliveryAttempt, Email, Folder, NewDeliveryAttempt, NewEmail, NewFolder};

type FolderKey = (Option<i64>, String);

/// In-memory storage backend.
///
/// Folder uniqueness is enforced through a `(parent_id, name)` index updated
/// with DashMap's entry API, so concurrent creates of the same pair cannot
/// both succeed. Deleting a folder removes its subtree and the templates in it.
pub struct MemoryStorageBackend {
    folders: DashMap<i64, Folder>,
    folder_names: DashMap<FolderKey, i64>,
    emails: DashMap<i64, Email>,
    attempts: DashMap<i64, DeliveryAttempt>,
    next_folder_id: AtomicI64,
    next_email_id: AtomicI64,
    next_attempt_id: AtomicI64,
}

impl Default for MemoryStorageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self {
            folders: DashMap::new(),
            folder_names: DashMap::new(),
            emails: DashMap::new(),
            attempts: DashMap::new(),
            next_folder_id: AtomicI64::new(1),
            next_email_id: AtomicI64::new(1),
            next_attempt_id: AtomicI64::new(1),
        }
    }

    /// Fails unless `folder_id` is absent or names a stored folder.
    fn require_folder(&self, folder_id: Option<i64>) -> Result<(), StorageError> {
        match folder_id {
            Some(id) if !self.folders.contains_key(&id) => {
                Err(StorageError::MissingFolder(format!("folder {}", id)))
            }
            _ => Ok(()),
        }
    }

    /// Ids of `root` and every folder below it.
    fn subtree(&self, root: i64) -> HashSet<i64> {
        let edges: Vec<(i64, Option<i64>)> = self
            .folders
            .iter()
            .map(|entry| (entry.id, entry.parent_id))
            .collect();

        let mut found = HashSet::from([root]);
        let mut frontier = vec![root];
        while let Some(parent) = frontier.pop() {
            for (id, parent_id) in &edges {
                if *parent_id == Some(parent) && found.insert(*id) {
                    frontier.push(*id);
                }
            }
        }
        found
    }
}

fn folder_key(folder: &Folder) -> FolderKey {
    (folder.parent_id, folder.name.clone())
}

fn apply_folder_change(folder: &mut Folder, change: &FolderChange) {
    match change {
        FolderChange::ParentId(v) => folder.parent_id = *v,
        FolderChange::Name(v) => folder.name = v.clone(),
        FolderChange::Description(v) => folder.description = v.clone(),
        FolderChange::UpdatedAt(v) => folder.updated_at = *v,
    }
}

fn apply_email_change(email: &mut Email, change: &EmailChange) {
    match change {
        EmailChange::FolderId(v) => email.folder_id = *v,
        EmailChange::FromEmail(v) => email.from_email = v.clone(),
        EmailChange::FromName(v) => email.from_name = v.clone(),
        EmailChange::Subject(v) => email.subject = v.clone(),
        EmailChange::Html(v) => email.html = v.clone(),
        EmailChange::Text(v) => email.text = v.clone(),
        EmailChange::Description(v) => email.description = v.clone(),
        EmailChange::UpdatedAt(v) => email.updated_at = *v,
    }
}

fn duplicate_folder(key: &FolderKey) -> StorageError {
    StorageError::UniqueViolation(format!(
        "folder {:?} already exists under parent {:?}",
        key.1, key.0
    ))
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn insert_folder(&self, folder: NewFolder) -> Result<Folder, StorageError> {
        self.require_folder(folder.parent_id)?;
        let key = (folder.parent_id, folder.name.clone());

        let created = match self.folder_names.entry(key) {
            Entry::Occupied(occupied) => return Err(duplicate_folder(occupied.key())),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let created = Folder {
                    id: self.next_folder_id.fetch_add(1, Ordering::SeqCst),
                    parent_id: folder.parent_id,
                    name: folder.name,
                    description: folder.description,
                    system_flag: folder.system_flag,
                    updated_at: now,
                    created_at: now,
                };
                slot.insert(created.id);
                self.folders.insert(created.id, created.clone());
                created
            }
        };

        tracing::trace!(folder_id = created.id, "Folder stored in memory");
        Ok(created)
    }

    async fn find_folders(&self, filter: &FolderFilter) -> Result<Vec<Folder>, StorageError> {
        let mut folders: Vec<Folder> = self
            .folders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        folders.sort_by_key(|f| f.id);
        Ok(folders)
    }

    async fn update_folder(&self, id: i64, changes: &[FolderChange]) -> Result<u64, StorageError> {
        let new_parent = changes.iter().find_map(|change| match change {
            FolderChange::ParentId(v) => Some(*v),
            _ => None,
        });
        if !self.folders.contains_key(&id) {
            return Ok(0);
        }
        self.require_folder(new_parent.flatten())?;

        // Claim the target name before locking the row, the same order as
        // insert_folder. Retry if the row's key moved in between.
        loop {
            let Some(old_key) = self.folders.get(&id).map(|folder| folder_key(&folder)) else {
                return Ok(0);
            };
            let new_key = changes.iter().fold(old_key.clone(), |key, change| match change {
                FolderChange::ParentId(v) => (*v, key.1),
                FolderChange::Name(v) => (key.0, v.clone()),
                _ => key,
            });
            let renamed = old_key != new_key;

            if renamed {
                match self.folder_names.entry(new_key.clone()) {
                    Entry::Occupied(occupied) => return Err(duplicate_folder(occupied.key())),
                    Entry::Vacant(slot) => {
                        slot.insert(id);
                    }
                }
            }

            let applied = match self.folders.get_mut(&id) {
                Some(mut folder) if folder_key(&folder) == old_key => {
                    for change in changes {
                        apply_folder_change(&mut folder, change);
                    }
                    true
                }
                _ => false,
            };

            if applied {
                if renamed {
                    self.folder_names.remove(&old_key);
                }
                return Ok(1);
            }

            if renamed {
                self.folder_names.remove(&new_key);
            }
            if !self.folders.contains_key(&id) {
                return Ok(0);
            }
        }
    }

    async fn delete_folder(&self, id: i64) -> Result<u64, StorageError> {
        if !self.folders.contains_key(&id) {
            return Ok(0);
        }

        let subtree = self.subtree(id);
        for folder_id in &subtree {
            if let Some((_, folder)) = self.folders.remove(folder_id) {
                self.folder_names.remove(&(folder.parent_id, folder.name));
            }
        }
        self.emails
            .retain(|_, email| !email.folder_id.is_some_and(|f| subtree.contains(&f)));

        tracing::trace!(
            folder_id = id,
            removed_folders = subtree.len(),
            "Folder subtree removed from memory"
        );
        Ok(1)
    }

    async fn insert_email(&self, email: NewEmail) -> Result<Email, StorageError> {
        self.require_folder(email.folder_id)?;
        let now = Utc::now();
        let created = Email {
            id: self.next_email_id.fetch_add(1, Ordering::SeqCst),
            folder_id: email.folder_id,
            from_email: email.from_email,
            from_name: email.from_name,
            subject: email.subject,
            html: email.html,
            text: email.text,
            description: email.description,
            system_flag: email.system_flag,
            updated_at: now,
            created_at: now,
        };
        self.emails.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_emails(&self, filter: &EmailFilter) -> Result<Vec<Email>, StorageError> {
        let mut emails: Vec<Email> = self
            .emails
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        emails.sort_by_key(|e| e.id);
        Ok(emails)
    }

    async fn update_email(&self, id: i64, changes: &[EmailChange]) -> Result<u64, StorageError> {
        let new_folder = changes.iter().find_map(|change| match change {
            EmailChange::FolderId(v) => Some(*v),
            _ => None,
        });
        if !self.emails.contains_key(&id) {
            return Ok(0);
        }
        self.require_folder(new_folder.flatten())?;

        match self.emails.get_mut(&id) {
            Some(mut email) => {
                for change in changes {
                    apply_email_change(&mut email, change);
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_email(&self, id: i64) -> Result<u64, StorageError> {
        Ok(self.emails.remove(&id).map_or(0, |_| 1))
    }

    async fn insert_delivery_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, StorageError> {
        let id = self.next_attempt_id.fetch_add(1, Ordering::SeqCst);
        let stored = attempt.with_id(id);
        self.attempts.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_delivery_attempts(
        &self,
        filter: &DeliveryAttemptFilter,
    ) -> Result<Vec<DeliveryAttempt>, StorageError> {
        let mut attempts: Vec<DeliveryAttempt> = self
            .attempts
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        attempts.sort_by_key(|a| a.id);
        Ok(attempts)
    }
}
