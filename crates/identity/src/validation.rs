//! Input validation shared by the account and token flows.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid username regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Emails are unique after trimming and lowercasing.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalizes and validates an email address.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(ValidationError::new("Email is required"));
    }
    if email.len() > 254 || !EMAIL_RE.is_match(&email) {
        return Err(ValidationError::new("Invalid email address"));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < 8 {
        return Err(ValidationError::new(
            "Password must be at least 8 characters long",
        ));
    }
    if password.len() > 128 {
        return Err(ValidationError::new(
            "Password must be less than 128 characters long",
        ));
    }
    Ok(())
}

/// Usernames are the public workspace handle, stored lowercase.
pub fn validate_username(username: &str) -> Result<String, ValidationError> {
    let username = username.trim().to_lowercase();
    if username.len() < 3 || username.len() > 30 {
        return Err(ValidationError::new(
            "Username must be between 3 and 30 characters long",
        ));
    }
    if !USERNAME_RE.is_match(&username) {
        return Err(ValidationError::new(
            "Username can only contain letters, numbers, underscores, and hyphens",
        ));
    }
    Ok(username)
}

pub fn validate_display_name(display_name: &str) -> Result<String, ValidationError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(ValidationError::new("Display name cannot be empty"));
    }
    if display_name.chars().count() > 80 {
        return Err(ValidationError::new(
            "Display name must be less than 80 characters long",
        ));
    }
    if display_name.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "Display name contains invalid characters",
        ));
    }
    Ok(display_name.to_string())
}
