//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{MAX_CONTENT_CHARS, MAX_TITLE_CHARS};

/// Maximum display name length, in characters
pub const MAX_DISPLAY_NAME_CHARS: usize = 100;

/// Validate post title
pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("Title is required".to_string());
    }

    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(format!(
            "Title must be at most {} characters long",
            MAX_TITLE_CHARS
        ));
    }

    Ok(())
}

/// Validate post content
pub fn validate_content(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Content is required".to_string());
    }

    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(format!(
            "Content must be at most {} characters long",
            MAX_CONTENT_CHARS
        ));
    }

    Ok(())
}

/// Validate a header image reference.
///
/// Accepts http(s) URLs and inline `data:image/...` URLs.
pub fn validate_header_image_url(url: &str) -> Result<(), String> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(());
    }

    static IMAGE_URL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = IMAGE_URL_REGEX.get_or_init(|| {
        Regex::new(r"^(https?://\S+|data:image/[a-zA-Z0-9.+-]+;base64,\S+)$")
            .expect("Failed to compile image url regex")
    });

    if !regex.is_match(url) {
        return Err("Header image must be an http(s) or data:image URL".to_string());
    }

    Ok(())
}

/// Validate a display name and return its trimmed form
pub fn validate_display_name(display_name: &str) -> Result<String, String> {
    let trimmed = display_name.trim();

    if trimmed.is_empty() {
        return Err("Display name cannot be empty".to_string());
    }

    if trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(format!(
            "Display name must be at most {} characters long",
            MAX_DISPLAY_NAME_CHARS
        ));
    }

    if trimmed.chars().any(char::is_control) {
        return Err("Display name cannot contain control characters".to_string());
    }

    Ok(trimmed.to_string())
}

/// Reduce an uploaded file name to a safe blob path segment
pub fn sanitize_file_name(file_name: &str) -> String {
    static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
    let regex = UNSAFE_CHARS
        .get_or_init(|| Regex::new(r"[^a-zA-Z0-9._-]+").expect("Failed to compile file regex"));

    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let cleaned = regex.replace_all(base, "_");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}
