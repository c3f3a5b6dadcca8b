//! Filter criteria for folder, template and delivery attempt queries.
//!
//! Every supplied criterion narrows the result (logical AND); within one
//! criterion a row matches if its value is a member of the supplied set.

use serde::{Deserialize, Deserializer};

use super::types::{DeliveryAttempt, DeliveryStatus, Email, Folder};

/// Set membership over a nullable column.
///
/// Deserializes from a JSON array that may contain `null`, e.g. `[null, 5]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullableSet<K> {
    pub values: Vec<K>,
    pub include_null: bool,
}

impl<K> NullableSet<K> {
    pub fn only_null() -> Self {
        Self {
            values: Vec::new(),
            include_null: true,
        }
    }

    pub fn of(values: Vec<K>) -> Self {
        Self {
            values,
            include_null: false,
        }
    }

    pub fn with_null(mut self) -> Self {
        self.include_null = true;
        self
    }

    /// A set with neither values nor null places no constraint on the column.
    pub fn is_unconstrained(&self) -> bool {
        self.values.is_empty() && !self.include_null
    }
}

impl<K: PartialEq> NullableSet<K> {
    pub fn matches(&self, value: Option<&K>) -> bool {
        if self.is_unconstrained() {
            return true;
        }
        match value {
            Some(v) => self.values.contains(v),
            None => self.include_null,
        }
    }
}

impl<K> FromIterator<Option<K>> for NullableSet<K> {
    fn from_iter<I: IntoIterator<Item = Option<K>>>(iter: I) -> Self {
        let mut set = NullableSet {
            values: Vec::new(),
            include_null: false,
        };
        for item in iter {
            match item {
                Some(v) => set.values.push(v),
                None => set.include_null = true,
            }
        }
        set
    }
}

impl<'de, K: Deserialize<'de>> Deserialize<'de> for NullableSet<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<Option<K>>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}

fn in_set<T: PartialEq>(set: &Option<Vec<T>>, value: &T) -> bool {
    set.as_ref().map_or(true, |values| values.contains(value))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderFilter {
    #[serde(default, rename = "id")]
    pub id_in: Option<Vec<i64>>,
    #[serde(default, rename = "parent_id")]
    pub parent_id_in: Option<NullableSet<i64>>,
    #[serde(default, rename = "name")]
    pub name_in: Option<Vec<String>>,
    #[serde(default)]
    pub system_flag: Option<bool>,
}

impl FolderFilter {
    pub fn matches(&self, folder: &Folder) -> bool {
        in_set(&self.id_in, &folder.id)
            && self
                .parent_id_in
                .as_ref()
                .map_or(true, |set| set.matches(folder.parent_id.as_ref()))
            && in_set(&self.name_in, &folder.name)
            && self.system_flag.map_or(true, |flag| folder.system_flag == flag)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailFilter {
    #[serde(default, rename = "id")]
    pub id_in: Option<Vec<i64>>,
    #[serde(default, rename = "folder_id")]
    pub folder_id_in: Option<NullableSet<i64>>,
    #[serde(default)]
    pub system_flag: Option<bool>,
}

impl EmailFilter {
    pub fn by_id(id: i64) -> Self {
        Self {
            id_in: Some(vec![id]),
            ..Default::default()
        }
    }

    pub fn matches(&self, email: &Email) -> bool {
        in_set(&self.id_in, &email.id)
            && self
                .folder_id_in
                .as_ref()
                .map_or(true, |set| set.matches(email.folder_id.as_ref()))
            && self.system_flag.map_or(true, |flag| email.system_flag == flag)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryAttemptFilter {
    #[serde(default, rename = "id")]
    pub id_in: Option<Vec<i64>>,
    #[serde(default, rename = "from_email")]
    pub from_email_in: Option<Vec<String>>,
    #[serde(default, rename = "from_name")]
    pub from_name_in: Option<Vec<String>>,
    #[serde(default, rename = "to_email")]
    pub to_email_in: Option<Vec<String>>,
    #[serde(default, rename = "status")]
    pub status_in: Option<Vec<DeliveryStatus>>,
    #[serde(default, rename = "message_id")]
    pub message_id_in: Option<Vec<String>>,
}

impl DeliveryAttemptFilter {
    pub fn matches(&self, attempt: &DeliveryAttempt) -> bool {
        in_set(&self.id_in, &attempt.id)
            && in_set(&self.from_email_in, &attempt.from_email)
            && in_set(&self.from_name_in, &attempt.from_name)
            && in_set(&self.to_email_in, &attempt.to_email)
            && in_set(&self.status_in, &attempt.status)
            && self.message_id_in.as_ref().map_or(true, |ids| {
                attempt
                    .message_id
                    .as_ref()
                    .is_some_and(|id| ids.contains(id))
            })
    }
}
