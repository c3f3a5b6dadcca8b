//! Folder, email template and delivery attempt records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node in the template folder tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Folder {
    pub id: i64,

    /// Parent folder; `None` for top-level folders
    pub parent_id: Option<i64>,

    pub name: String,

    pub description: String,

    /// Folder is managed by the system and not meant for user edits
    pub system_flag: bool,

    #[serde(rename = "updated")]
    #[sqlx(rename = "updated")]
    pub updated_at: DateTime<Utc>,

    #[serde(rename = "created")]
    #[sqlx(rename = "created")]
    pub created_at: DateTime<Utc>,
}

/// A stored email template.
///
/// `subject`, `html` and `text` are template sources, rendered at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Email {
    pub id: i64,

    /// Owning folder; `None` for unfiled templates
    pub folder_id: Option<i64>,

    pub from_email: String,

    pub from_name: String,

    pub subject: String,

    pub html: String,

    pub text: String,

    pub description: String,

    pub system_flag: bool,

    #[serde(rename = "updated")]
    #[sqlx(rename = "updated")]
    pub updated_at: DateTime<Utc>,

    #[serde(rename = "created")]
    #[sqlx(rename = "created")]
    pub created_at: DateTime<Utc>,
}

/// Classified outcome of a provider round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Error,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Success => "success",
            DeliveryStatus::Error => "error",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(DeliveryStatus::Success),
            "error" => Ok(DeliveryStatus::Error),
            other => Err(format!("unknown delivery status: {}", other)),
        }
    }
}

/// Immutable audit record of one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: i64,
    pub from_email: String,
    pub from_name: String,
    pub subject: String,
    pub to_email: String,
    pub html: String,
    pub text: String,
    pub status: DeliveryStatus,

    /// Provider message id, set on success
    pub message_id: Option<String>,

    /// Provider-reported reason, set on error
    #[serde(rename = "errors")]
    pub error_detail: Option<String>,

    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
}

/// Fields for a new folder
#[derive(Debug, Clone, Deserialize)]
pub struct NewFolder {
    pub parent_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_flag: bool,
}

/// Fields for a new email template
#[derive(Debug, Clone, Deserialize)]
pub struct NewEmail {
    pub folder_id: Option<i64>,
    pub from_email: String,
    pub from_name: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_flag: bool,
}

/// Delivery attempt before the backend assigns its id
#[derive(Debug, Clone)]
pub struct NewDeliveryAttempt {
    pub from_email: String,
    pub from_name: String,
    pub subject: String,
    pub to_email: String,
    pub html: String,
    pub text: String,
    pub status: DeliveryStatus,
    pub message_id: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewDeliveryAttempt {
    pub fn with_id(self, id: i64) -> DeliveryAttempt {
        DeliveryAttempt {
            id,
            from_email: self.from_email,
            from_name: self.from_name,
            subject: self.subject,
            to_email: self.to_email,
            html: self.html,
            text: self.text,
            status: self.status,
            message_id: self.message_id,
            error_detail: self.error_detail,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_status_round_trips_through_str() {
        assert_eq!("success".parse::<DeliveryStatus>(), Ok(DeliveryStatus::Success));
        assert_eq!("error".parse::<DeliveryStatus>(), Ok(DeliveryStatus::Error));
        assert!("pending".parse::<DeliveryStatus>().is_err());
        assert_eq!(DeliveryStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_delivery_attempt_serializes_wire_names() {
        let attempt = NewDeliveryAttempt {
            from_email: "noreply@example.com".to_string(),
            from_name: "Example".to_string(),
            subject: "Hi".to_string(),
            to_email: "a@b.com".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
            status: DeliveryStatus::Error,
            message_id: None,
            error_detail: Some("Unauthorized".to_string()),
            created_at: Utc::now(),
        }
        .with_id(7);

        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "error");
        assert_eq!(json["errors"], "Unauthorized");
        assert!(json["message_id"].is_null());
    }
}
