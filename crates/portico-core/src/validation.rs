//! Field validation rules
//!
//! Each check returns `None` when the value is acceptable, otherwise a
//! [`FieldError`] naming the request field. Callers collect every problem
//! before rejecting so clients can fix all fields in one round trip.

use validator::{ValidateEmail, ValidateUrl};

use crate::FieldError;

/// Maximum length of usernames and aliases
pub const MAX_NAME_LEN: usize = 150;

/// Maximum length of an entity name
pub const MAX_ENTITY_NAME_LEN: usize = 150;

/// Maximum length of an entity link
pub const MAX_LINK_LEN: usize = 200;

/// Usernames: letters, digits and `@ . + - _`
pub fn validate_username(username: &str) -> Option<FieldError> {
    if username.is_empty() {
        return Some(FieldError::new("username", "This field may not be blank."));
    }
    if username.chars().count() > MAX_NAME_LEN {
        return Some(FieldError::new(
            "username",
            format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
        ));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if !username.chars().all(allowed) {
        return Some(FieldError::new(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    None
}

/// Aliases: letters, digits, space, underscore and hyphen
pub fn validate_alt_name(alt_name: &str) -> Option<FieldError> {
    if alt_name.trim().is_empty() {
        return Some(FieldError::new("alt_name", "This field may not be blank."));
    }
    if alt_name.chars().count() > MAX_NAME_LEN {
        return Some(FieldError::new(
            "alt_name",
            format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
        ));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-');
    if !alt_name.chars().all(allowed) {
        return Some(FieldError::new(
            "alt_name",
            "Alias may contain only letters, numbers, spaces, underscores and hyphens.",
        ));
    }
    None
}

pub fn validate_email(email: &str) -> Option<FieldError> {
    if email.is_empty() {
        return Some(FieldError::new("email", "This field may not be blank."));
    }
    if !email.validate_email() {
        return Some(FieldError::new("email", "Enter a valid email address."));
    }
    None
}

/// Run the username, email and alias checks together
pub fn validate_profile(username: &str, email: &str, alt_name: &str) -> Vec<FieldError> {
    [
        validate_username(username),
        validate_email(email),
        validate_alt_name(alt_name),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn validate_entity_name(name: &str) -> Option<FieldError> {
    if name.trim().is_empty() {
        return Some(FieldError::new("name", "No empty name for an entity."));
    }
    if name.chars().count() > MAX_ENTITY_NAME_LEN {
        return Some(FieldError::new(
            "name",
            format!("Ensure this field has no more than {MAX_ENTITY_NAME_LEN} characters."),
        ));
    }
    None
}

pub fn validate_link(link: &str) -> Option<FieldError> {
    if link.is_empty() {
        return Some(FieldError::new("link", "This field may not be blank."));
    }
    if link.chars().count() > MAX_LINK_LEN {
        return Some(FieldError::new(
            "link",
            format!("Ensure this field has no more than {MAX_LINK_LEN} characters."),
        ));
    }
    if !link.validate_url() {
        return Some(FieldError::new("link", "Enter a valid URL."));
    }
    None
}

pub fn validate_views(views: i64) -> Option<FieldError> {
    if views < 0 {
        return Some(FieldError::new(
            "views",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    None
}
