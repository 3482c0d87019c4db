//! Validation of user-supplied text.
//!
//! Titles are short printable ASCII strings. Descriptions may be any unicode
//! text but must not smuggle NUL bytes or terminal control sequences into the
//! records the marketplace stores forever.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::LimitsConfig;
use crate::error::{MarketError, Result};

/// Printable ASCII, starting and ending with a non-space character.
static TITLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\x21-\x7E](?:[\x20-\x7E]*[\x21-\x7E])?$").unwrap_or_else(|_| unreachable!())
});

/// Validate a job title.
///
/// Titles must:
/// - Be non-empty and at most `max_title_len` characters
/// - Contain only printable ASCII
/// - Not begin or end with a space
///
/// # Errors
///
/// Returns [`MarketError::InvalidParameter`] naming the `title` field.
pub fn validate_title(title: &str, limits: &LimitsConfig) -> Result<()> {
    if title.is_empty() {
        return Err(MarketError::invalid_parameter("title", "cannot be empty"));
    }

    let len = title.chars().count();
    if len > limits.max_title_len {
        return Err(MarketError::invalid_parameter(
            "title",
            format!("length {len} exceeds maximum {}", limits.max_title_len),
        ));
    }

    if !TITLE_REGEX.is_match(title) {
        return Err(MarketError::invalid_parameter(
            "title",
            "must be printable ASCII without leading or trailing spaces",
        ));
    }

    Ok(())
}

/// Validate a job or proposal description.
///
/// Length is counted in unicode scalar values. Newlines and tabs are allowed;
/// every other control character is rejected.
///
/// # Errors
///
/// Returns [`MarketError::InvalidParameter`] naming the `description` field.
pub fn validate_description(description: &str, limits: &LimitsConfig) -> Result<()> {
    let len = description.chars().count();
    if len > limits.max_description_len {
        return Err(MarketError::invalid_parameter(
            "description",
            format!("length {len} exceeds maximum {}", limits.max_description_len),
        ));
    }

    if let Some(c) = description
        .chars()
        .find(|c| c.is_control() && *c != '\n' && *c != '\t')
    {
        return Err(MarketError::invalid_parameter(
            "description",
            format!("contains control character U+{:04X}", u32::from(c)),
        ));
    }

    Ok(())
}
