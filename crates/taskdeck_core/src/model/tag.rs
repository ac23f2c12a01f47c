//! Tag domain model.
//!
//! # Invariants
//! - Names are unique per owner, compared case-insensitively.
//! - Colors are stored canonically as six uppercase hex digits without `#`;
//!   input may carry a leading `#` and any letter case.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a tag row.
pub type TagId = Uuid;

pub const TAG_NAME_MAX_CHARS: usize = 50;
pub const TAG_DESCRIPTION_MAX_CHARS: usize = 200;

/// Neutral grey used when an imported tag carries a malformed color.
pub const FALLBACK_TAG_COLOR: &str = "808080";

static TAG_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?[0-9A-Fa-f]{6}$").expect("valid tag color regex"));

/// Normalizes a color to canonical form, or `None` when malformed.
pub fn normalize_color(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if !TAG_COLOR_RE.is_match(trimmed) {
        return None;
    }
    Some(trimmed.trim_start_matches('#').to_ascii_uppercase())
}

/// Canonical tag record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub uuid: TagId,
    pub owner_uuid: Uuid,
    pub name: String,
    /// Canonical six-digit uppercase hex, no `#`.
    pub color: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(
        owner_uuid: Uuid,
        name: impl Into<String>,
        color: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            owner_uuid,
            name: name.into(),
            color: color.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks field-level invariants. The color is accepted in any input
    /// form the normalizer understands; repositories persist the canonical
    /// form.
    pub fn validate(&self) -> Result<(), TagValidationError> {
        let name_chars = self.name.chars().count();
        if self.name.trim().is_empty() {
            return Err(TagValidationError::EmptyName);
        }
        if name_chars > TAG_NAME_MAX_CHARS {
            return Err(TagValidationError::NameTooLong { chars: name_chars });
        }
        if normalize_color(&self.color).is_none() {
            return Err(TagValidationError::InvalidColor {
                value: self.color.clone(),
            });
        }
        if let Some(description) = &self.description {
            let description_chars = description.chars().count();
            if description_chars > TAG_DESCRIPTION_MAX_CHARS {
                return Err(TagValidationError::DescriptionTooLong {
                    chars: description_chars,
                });
            }
        }
        Ok(())
    }
}

/// Field-level validation failures for tag writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValidationError {
    EmptyName,
    NameTooLong { chars: usize },
    InvalidColor { value: String },
    DescriptionTooLong { chars: usize },
}

impl Display for TagValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "tag name must not be empty"),
            Self::NameTooLong { chars } => write!(
                f,
                "tag name has {chars} characters, maximum is {TAG_NAME_MAX_CHARS}"
            ),
            Self::InvalidColor { value } => {
                write!(f, "tag color `{value}` is not a six-digit hex value")
            }
            Self::DescriptionTooLong { chars } => write!(
                f,
                "tag description has {chars} characters, maximum is {TAG_DESCRIPTION_MAX_CHARS}"
            ),
        }
    }
}

impl Error for TagValidationError {}

#[cfg(test)]
mod tests {
    use super::normalize_color;

    #[test]
    fn normalize_color_uppercases_and_strips_hash() {
        assert_eq!(normalize_color("#ff8800").as_deref(), Some("FF8800"));
        assert_eq!(normalize_color("00aaFF").as_deref(), Some("00AAFF"));
        assert_eq!(normalize_color(" 123abc ").as_deref(), Some("123ABC"));
    }

    #[test]
    fn normalize_color_rejects_malformed_values() {
        for value in ["", "#ff88", "red", "12345g", "#1234567"] {
            assert!(normalize_color(value).is_none(), "{value} should be rejected");
        }
    }
}
