//! Partial updates for folders and email templates.
//!
//! A [`Patch`] distinguishes "field not supplied" from "field supplied"
//! (including an explicit `null` for nullable fields). Patches are lowered
//! to a list of column changes that backends apply verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// A single field of a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Unset,
    Set(T),
}

impl<T> Patch<T> {
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            Patch::Unset => None,
        }
    }
}

// Absent fields fall back to `Unset` through `#[serde(default)]`; anything
// present, `null` included, is `Set`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

/// Column-level change to a folder row
#[derive(Debug, Clone, PartialEq)]
pub enum FolderChange {
    ParentId(Option<i64>),
    Name(String),
    Description(String),
    UpdatedAt(DateTime<Utc>),
}

impl FolderChange {
    pub fn column(&self) -> &'static str {
        match self {
            FolderChange::ParentId(_) => "parent_id",
            FolderChange::Name(_) => "name",
            FolderChange::Description(_) => "description",
            FolderChange::UpdatedAt(_) => "updated",
        }
    }
}

/// Column-level change to an email template row
#[derive(Debug, Clone, PartialEq)]
pub enum EmailChange {
    FolderId(Option<i64>),
    FromEmail(String),
    FromName(String),
    Subject(String),
    Html(String),
    Text(String),
    Description(String),
    UpdatedAt(DateTime<Utc>),
}

impl EmailChange {
    pub fn column(&self) -> &'static str {
        match self {
            EmailChange::FolderId(_) => "folder_id",
            EmailChange::FromEmail(_) => "from_email",
            EmailChange::FromName(_) => "from_name",
            EmailChange::Subject(_) => "subject",
            EmailChange::Html(_) => "html",
            EmailChange::Text(_) => "text",
            EmailChange::Description(_) => "description",
            EmailChange::UpdatedAt(_) => "updated",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderPatch {
    #[serde(default)]
    pub parent_id: Patch<Option<i64>>,
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub description: Patch<String>,
}

impl FolderPatch {
    /// Lower to column changes, always stamping `updated`.
    pub fn into_changes(self, now: DateTime<Utc>) -> Vec<FolderChange> {
        let mut changes = Vec::new();
        if let Patch::Set(parent_id) = self.parent_id {
            changes.push(FolderChange::ParentId(parent_id));
        }
        if let Patch::Set(name) = self.name {
            changes.push(FolderChange::Name(name));
        }
        if let Patch::Set(description) = self.description {
            changes.push(FolderChange::Description(description));
        }
        changes.push(FolderChange::UpdatedAt(now));
        changes
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailPatch {
    #[serde(default)]
    pub folder_id: Patch<Option<i64>>,
    #[serde(default)]
    pub from_email: Patch<String>,
    #[serde(default)]
    pub from_name: Patch<String>,
    #[serde(default)]
    pub subject: Patch<String>,
    #[serde(default)]
    pub html: Patch<String>,
    #[serde(default)]
    pub text: Patch<String>,
    #[serde(default)]
    pub description: Patch<String>,
}

impl EmailPatch {
    /// Lower to column changes, always stamping `updated`.
    pub fn into_changes(self, now: DateTime<Utc>) -> Vec<EmailChange> {
        let mut changes = Vec::new();
        if let Patch::Set(folder_id) = self.folder_id {
            changes.push(EmailChange::FolderId(folder_id));
        }
        if let Patch::Set(v) = self.from_email {
            changes.push(EmailChange::FromEmail(v));
        }
        if let Patch::Set(v) = self.from_name {
            changes.push(EmailChange::FromName(v));
        }
        if let Patch::Set(v) = self.subject {
            changes.push(EmailChange::Subject(v));
        }
        if let Patch::Set(v) = self.html {
            changes.push(EmailChange::Html(v));
        }
        if let Patch::Set(v) = self.text {
            changes.push(EmailChange::Text(v));
        }
        if let Patch::Set(v) = self.description {
            changes.push(EmailChange::Description(v));
        }
        changes.push(EmailChange::UpdatedAt(now));
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_null_and_value_are_distinct() {
        let absent: FolderPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.parent_id, Patch::Unset);

        let null: FolderPatch = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(null.parent_id, Patch::Set(None));

        let value: FolderPatch = serde_json::from_str(r#"{"parent_id": 3}"#).unwrap();
        assert_eq!(value.parent_id, Patch::Set(Some(3)));
    }

    #[test]
    fn test_null_for_required_field_is_rejected() {
        let result: Result<FolderPatch, _> = serde_json::from_str(r#"{"name": null}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_changes_only_include_set_fields_plus_timestamp() {
        let now = Utc::now();
        let patch = EmailPatch {
            subject: Patch::Set("New subject".to_string()),
            folder_id: Patch::Set(None),
            ..Default::default()
        };

        let changes = patch.into_changes(now);
        assert_eq!(
            changes,
            vec![
                EmailChange::FolderId(None),
                EmailChange::Subject("New subject".to_string()),
                EmailChange::UpdatedAt(now),
            ]
        );
    }

    #[test]
    fn test_empty_patch_still_stamps_updated() {
        let now = Utc::now();
        let changes = FolderPatch::default().into_changes(now);
        assert_eq!(changes, vec![FolderChange::UpdatedAt(now)]);
        assert_eq!(changes[0].column(), "updated");
    }
}
