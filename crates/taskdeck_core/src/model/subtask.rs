//! Subtask domain model.
//!
//! # Invariants
//! - Positions for a given todo always form a dense 1..N sequence; the
//!   repository renumbers after every structural change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a subtask row.
pub type SubtaskId = Uuid;

pub const SUBTASK_TITLE_MAX_CHARS: usize = 200;

/// Canonical subtask record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub uuid: SubtaskId,
    pub todo_uuid: Uuid,
    pub title: String,
    /// 1-based position within the parent todo.
    pub position: i64,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subtask {
    pub fn new(
        todo_uuid: Uuid,
        title: impl Into<String>,
        position: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            todo_uuid,
            title: title.into(),
            position,
            is_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), SubtaskValidationError> {
        let title_chars = self.title.chars().count();
        if self.title.trim().is_empty() {
            return Err(SubtaskValidationError::EmptyTitle);
        }
        if title_chars > SUBTASK_TITLE_MAX_CHARS {
            return Err(SubtaskValidationError::TitleTooLong { chars: title_chars });
        }
        if self.position < 1 {
            return Err(SubtaskValidationError::InvalidPosition {
                position: self.position,
            });
        }
        Ok(())
    }
}

/// Field-level validation failures for subtask writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtaskValidationError {
    EmptyTitle,
    TitleTooLong { chars: usize },
    InvalidPosition { position: i64 },
}

impl Display for SubtaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "subtask title must not be empty"),
            Self::TitleTooLong { chars } => write!(
                f,
                "subtask title has {chars} characters, maximum is {SUBTASK_TITLE_MAX_CHARS}"
            ),
            Self::InvalidPosition { position } => {
                write!(f, "subtask position {position} must be 1 or greater")
            }
        }
    }
}

impl Error for SubtaskValidationError {}
