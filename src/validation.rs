use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, ZestyError};
use crate::models::Category;

/// Report form contents before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportDraft {
    /// Category label as picked in the form ("Safety", "cleaning", ...)
    pub category: String,
    /// Location slug, display name or free text
    pub location: String,
    pub description: String,
    pub detailed_description: Option<String>,
    /// Priority label; empty means the default
    pub priority: Option<String>,
    pub image: Option<ImageAttachment>,
}

/// A photo picked in the report form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    /// Build an attachment, guessing the content type from the extension
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).to_string();
        Self { file_name, content_type, bytes }
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Upper bound for uploaded photos
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Validation utilities for form input
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Check the report form's required fields: category, location, description.
    ///
    /// All missing fields are reported together.
    pub fn validate_report(draft: &ReportDraft) -> Result<()> {
        let mut missing = Vec::new();
        if draft.category.trim().is_empty() {
            missing.push("category");
        }
        if draft.location.trim().is_empty() {
            missing.push("location");
        }
        if draft.description.trim().is_empty() {
            missing.push("description");
        }
        if !missing.is_empty() {
            return Err(ZestyError::Validation(format!(
                "Please fill in the required fields: {}",
                missing.join(", ")
            )));
        }

        draft.category.parse::<Category>()?;
        if let Some(priority) = draft.priority.as_deref().filter(|p| !p.trim().is_empty()) {
            priority.parse::<crate::models::Priority>()?;
        }

        if draft.description.len() > 500 {
            return Err(ZestyError::Validation(
                "Description too long (max 500 characters)".to_string(),
            ));
        }

        if let Some(image) = &draft.image {
            Self::validate_image(image)?;
        }

        Ok(())
    }

    /// Validate an attached photo
    pub fn validate_image(image: &ImageAttachment) -> Result<()> {
        if image.bytes.is_empty() {
            return Err(ZestyError::Validation("Selected image is empty".to_string()));
        }
        if image.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ZestyError::Validation("Image too large (max 10 MB)".to_string()));
        }
        if !image.content_type.starts_with("image/") {
            return Err(ZestyError::Validation(format!(
                "{} is not an image",
                image.file_name
            )));
        }
        Ok(())
    }

    /// Validate a display name
    pub fn validate_display_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ZestyError::Validation("Name cannot be empty".to_string()));
        }

        if name.len() > 100 {
            return Err(ZestyError::Validation("Name too long (max 100 characters)".to_string()));
        }

        // Check for potentially dangerous characters
        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return Err(ZestyError::Validation("Name contains invalid characters".to_string()));
        }

        Ok(())
    }

    /// Validate phone number format
    pub fn validate_phone(phone: &str) -> Result<()> {
        if phone.trim().is_empty() {
            return Err(ZestyError::Validation("Phone number cannot be empty".to_string()));
        }

        if phone
            .chars()
            .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.')))
        {
            return Err(ZestyError::Validation(
                "Phone number contains invalid characters".to_string(),
            ));
        }

        let digits_only = phone.chars().filter(char::is_ascii_digit).count();
        if !(7..=15).contains(&digits_only) {
            return Err(ZestyError::Validation(
                "Phone number must be between 7 and 15 digits".to_string(),
            ));
        }

        if phone.trim_start().chars().skip(1).any(|c| c == '+') {
            return Err(ZestyError::Validation("Only a leading + is allowed".to_string()));
        }

        Ok(())
    }

    /// Validate email format
    pub fn validate_email(email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(ZestyError::Validation("Email cannot be empty".to_string()));
        }

        if email.len() > 254 {
            return Err(ZestyError::Validation("Email too long (max 254 characters)".to_string()));
        }

        let parts: Vec<&str> = email.split('@').collect();
        if parts.len() != 2 {
            return Err(ZestyError::Validation("Email must have exactly one @ symbol".to_string()));
        }

        let local_part = parts[0];
        let domain_part = parts[1];

        if local_part.is_empty() || local_part.len() > 64 {
            return Err(ZestyError::Validation("Email local part invalid".to_string()));
        }

        if domain_part.is_empty() || !domain_part.contains('.') || domain_part.starts_with('.') {
            return Err(ZestyError::Validation("Email domain invalid".to_string()));
        }

        Ok(())
    }

    /// Validate sign-in input before calling the auth provider
    pub fn validate_credentials(email: &str, password: &str) -> Result<()> {
        Self::validate_email(email)?;
        if password.is_empty() {
            return Err(ZestyError::Validation("Password cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Validate a new password and its confirmation
    pub fn validate_new_password(password: &str, confirmation: &str) -> Result<()> {
        if password.chars().count() < 8 {
            return Err(ZestyError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        if password != confirmation {
            return Err(ZestyError::Validation("Passwords do not match".to_string()));
        }
        Ok(())
    }

    /// Validate a message body; returns the sanitized text to send
    pub fn validate_message_body(body: &str, max_len: usize) -> Result<String> {
        let clean = Self::sanitize_text(body);
        if clean.is_empty() {
            return Err(ZestyError::Validation("Message cannot be empty".to_string()));
        }
        if clean.chars().count() > max_len {
            return Err(ZestyError::Validation(format!(
                "Message too long (max {max_len} characters)"
            )));
        }
        Ok(clean)
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Make a file name safe to use as a storage object key
    #[must_use]
    pub fn sanitize_object_name(file_name: &str) -> String {
        static UNSAFE: OnceLock<Regex> = OnceLock::new();
        let unsafe_chars = UNSAFE.get_or_init(|| {
            #[allow(clippy::unwrap_used)]
            Regex::new(r"[^A-Za-z0-9._-]+").unwrap()
        });

        let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
        let cleaned = unsafe_chars.replace_all(base, "_");
        let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');
        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned.to_string()
        }
    }
}
