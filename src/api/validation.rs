//! Request body checks applied before anything reaches the service.

use crate::dispatch::OutgoingEmail;
use crate::error::AppError;
use crate::service::SendRequest;
use crate::store::{EmailPatch, FolderPatch, NewEmail, NewFolder, Patch};

pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

fn invalid(code: &str, message: &str) -> AppError {
    AppError::Validation(format!("{}: {}", code, message))
}

fn require_id(id: Option<i64>, code: &str) -> Result<(), AppError> {
    match id {
        Some(id) if id < 1 => Err(invalid(code, "id must be a positive integer")),
        _ => Ok(()),
    }
}

fn require_text(value: &str, code: &str, field: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(invalid(code, &format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_address(value: &str, code: &str, field: &str) -> Result<(), AppError> {
    require_text(value, code, field)?;
    if !is_valid_address(value) {
        return Err(invalid(code, &format!("{} is not a valid email address", field)));
    }
    Ok(())
}

fn patched_text(patch: &Patch<String>, code: &str, field: &str) -> Result<(), AppError> {
    match patch.as_set() {
        Some(value) => require_text(value, code, field),
        None => Ok(()),
    }
}

/// Accepts `user@example.com` and `Name <user@example.com>`.
pub fn is_valid_address(value: &str) -> bool {
    let value = value.trim();
    let address = match (value.rfind('<'), value.strip_suffix('>')) {
        (Some(open), Some(inner)) => &inner[open + 1..],
        (None, None) => value,
        _ => return false,
    };

    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(|c| c.is_whitespace() || c.is_control())
}

impl Validate for NewFolder {
    fn validate(&self) -> Result<(), AppError> {
        require_id(self.parent_id, "invalid_parent")?;
        require_text(&self.name, "invalid_name", "name")
    }
}

impl Validate for FolderPatch {
    fn validate(&self) -> Result<(), AppError> {
        require_id(self.parent_id.as_set().copied().flatten(), "invalid_parent")?;
        patched_text(&self.name, "invalid_name", "name")?;
        patched_text(&self.description, "invalid_description", "description")
    }
}

impl Validate for NewEmail {
    fn validate(&self) -> Result<(), AppError> {
        require_id(self.folder_id, "invalid_folder_id")?;
        require_address(&self.from_email, "invalid_from_email", "from_email")?;
        require_text(&self.from_name, "invalid_from_name", "from_name")?;
        require_text(&self.subject, "invalid_subject", "subject")?;
        require_text(&self.html, "invalid_html", "html")?;
        require_text(&self.text, "invalid_text", "text")
    }
}

impl Validate for EmailPatch {
    fn validate(&self) -> Result<(), AppError> {
        require_id(self.folder_id.as_set().copied().flatten(), "invalid_folder_id")?;
        if let Some(from_email) = self.from_email.as_set() {
            require_address(from_email, "invalid_from_email", "from_email")?;
        }
        patched_text(&self.from_name, "invalid_from_name", "from_name")?;
        patched_text(&self.subject, "invalid_subject", "subject")?;
        patched_text(&self.html, "invalid_html", "html")?;
        patched_text(&self.text, "invalid_text", "text")?;
        patched_text(&self.description, "invalid_description", "description")
    }
}

impl Validate for SendRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.email_id < 1 {
            return Err(invalid("invalid_id", "email_id must be a positive integer"));
        }
        require_address(&self.to_email, "invalid_to_email", "to_email")
    }
}

impl Validate for OutgoingEmail {
    fn validate(&self) -> Result<(), AppError> {
        require_address(&self.from_email, "invalid_from_email", "from_email")?;
        require_text(&self.from_name, "invalid_from_name", "from_name")?;
        require_text(&self.subject, "invalid_subject", "subject")?;
        require_address(&self.to_email, "invalid_to_email", "to_email")?;
        require_text(&self.html, "invalid_html", "html")?;
        require_text(&self.text, "invalid_text", "text")
    }
}
