//! Template (todo blueprint) domain model.
//!
//! # Responsibility
//! - Define the reusable blueprint a todo can be materialized from.
//! - Normalize subtask blueprints to a dense 1..N ordering at save time.
//!
//! # Invariants
//! - Names are unique per owner, compared case-insensitively.
//! - A saved blueprint never contains gaps or duplicates in subtask
//!   positions.

use crate::model::subtask::SUBTASK_TITLE_MAX_CHARS;
use crate::model::todo::{
    is_supported_reminder_offset, Priority, RecurrencePattern, TODO_DESCRIPTION_MAX_CHARS,
    TODO_TITLE_MAX_CHARS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a template row.
pub type TemplateId = Uuid;

pub const TEMPLATE_NAME_MAX_CHARS: usize = 80;

/// One subtask blueprint inside a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSubtask {
    pub title: String,
    /// Caller-supplied ordering key; normalized to dense 1..N on save.
    pub position: i64,
}

/// Reusable todo blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub uuid: TemplateId,
    pub owner_uuid: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub todo_title: String,
    pub todo_description: String,
    pub priority: Priority,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub reminder_minutes: Option<i64>,
    /// Days from "now" to the materialized due instant; non-negative.
    pub due_offset_days: Option<i64>,
    /// Estimated effort in minutes; strictly positive when set.
    pub estimated_minutes: Option<i64>,
    /// Referenced tag ids; dangling references are tolerated at
    /// materialization time and reported, not fatal.
    pub tag_uuids: Vec<Uuid>,
    pub subtasks: Vec<TemplateSubtask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(owner_uuid: Uuid, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            owner_uuid,
            name: name.into(),
            category: None,
            description: None,
            todo_title: String::new(),
            todo_description: String::new(),
            priority: Priority::Medium,
            recurrence_pattern: None,
            reminder_minutes: None,
            due_offset_days: None,
            estimated_minutes: None,
            tag_uuids: Vec::new(),
            subtasks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks every sub-field independently, as the engine operations
    /// require.
    pub fn validate(&self) -> Result<(), TemplateValidationError> {
        let name_chars = self.name.chars().count();
        if self.name.trim().is_empty() {
            return Err(TemplateValidationError::EmptyName);
        }
        if name_chars > TEMPLATE_NAME_MAX_CHARS {
            return Err(TemplateValidationError::NameTooLong { chars: name_chars });
        }
        if self.todo_title.trim().is_empty() {
            return Err(TemplateValidationError::EmptyTodoTitle);
        }
        if self.todo_title.chars().count() > TODO_TITLE_MAX_CHARS {
            return Err(TemplateValidationError::TodoTitleTooLong {
                chars: self.todo_title.chars().count(),
            });
        }
        if self.todo_description.chars().count() > TODO_DESCRIPTION_MAX_CHARS {
            return Err(TemplateValidationError::TodoDescriptionTooLong {
                chars: self.todo_description.chars().count(),
            });
        }
        if let Some(minutes) = self.reminder_minutes {
            if !is_supported_reminder_offset(minutes) {
                return Err(TemplateValidationError::UnsupportedReminderOffset { minutes });
            }
        }
        if let Some(days) = self.due_offset_days {
            if days < 0 {
                return Err(TemplateValidationError::NegativeDueOffset { days });
            }
        }
        if let Some(minutes) = self.estimated_minutes {
            if minutes <= 0 {
                return Err(TemplateValidationError::NonPositiveEstimate { minutes });
            }
        }
        for (index, subtask) in self.subtasks.iter().enumerate() {
            if subtask.title.trim().is_empty() {
                return Err(TemplateValidationError::EmptySubtaskTitle { index });
            }
            if subtask.title.chars().count() > SUBTASK_TITLE_MAX_CHARS {
                return Err(TemplateValidationError::SubtaskTitleTooLong {
                    index,
                    chars: subtask.title.chars().count(),
                });
            }
        }
        Ok(())
    }
}

/// Sorts blueprints by caller-supplied position (stable for ties) and
/// renumbers them to a dense 1..N sequence.
pub fn normalize_blueprint_subtasks(mut subtasks: Vec<TemplateSubtask>) -> Vec<TemplateSubtask> {
    subtasks.sort_by_key(|subtask| subtask.position);
    for (index, subtask) in subtasks.iter_mut().enumerate() {
        subtask.position = index as i64 + 1;
    }
    subtasks
}

/// Field-level validation failures for template writes and materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValidationError {
    EmptyName,
    NameTooLong { chars: usize },
    EmptyTodoTitle,
    TodoTitleTooLong { chars: usize },
    TodoDescriptionTooLong { chars: usize },
    UnsupportedReminderOffset { minutes: i64 },
    NegativeDueOffset { days: i64 },
    NonPositiveEstimate { minutes: i64 },
    EmptySubtaskTitle { index: usize },
    SubtaskTitleTooLong { index: usize, chars: usize },
    /// Explicit due instant passed to materialization is not ≥1 minute in
    /// the future.
    DueInstantNotInFuture,
    /// The blueprint declares a recurrence pattern but materialization
    /// resolved no due instant.
    RecurrenceRequiresDue,
    /// The blueprint declares a reminder offset but materialization
    /// resolved no due instant.
    ReminderRequiresDue,
}

impl Display for TemplateValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "template name must not be empty"),
            Self::NameTooLong { chars } => write!(
                f,
                "template name has {chars} characters, maximum is {TEMPLATE_NAME_MAX_CHARS}"
            ),
            Self::EmptyTodoTitle => write!(f, "template todo title must not be empty"),
            Self::TodoTitleTooLong { chars } => write!(
                f,
                "template todo title has {chars} characters, maximum is {TODO_TITLE_MAX_CHARS}"
            ),
            Self::TodoDescriptionTooLong { chars } => write!(
                f,
                "template todo description has {chars} characters, maximum is {TODO_DESCRIPTION_MAX_CHARS}"
            ),
            Self::UnsupportedReminderOffset { minutes } => {
                write!(f, "reminder offset {minutes} is not a supported value")
            }
            Self::NegativeDueOffset { days } => {
                write!(f, "due offset {days} days must not be negative")
            }
            Self::NonPositiveEstimate { minutes } => {
                write!(f, "estimated duration {minutes} minutes must be positive")
            }
            Self::EmptySubtaskTitle { index } => {
                write!(f, "subtask blueprint {index} has an empty title")
            }
            Self::SubtaskTitleTooLong { index, chars } => write!(
                f,
                "subtask blueprint {index} title has {chars} characters, maximum is {SUBTASK_TITLE_MAX_CHARS}"
            ),
            Self::DueInstantNotInFuture => {
                write!(f, "explicit due instant must be at least one minute in the future")
            }
            Self::RecurrenceRequiresDue => {
                write!(f, "template declares a recurrence pattern but no due instant resolved")
            }
            Self::ReminderRequiresDue => {
                write!(f, "template declares a reminder offset but no due instant resolved")
            }
        }
    }
}

impl Error for TemplateValidationError {}

#[cfg(test)]
mod tests {
    use super::{normalize_blueprint_subtasks, TemplateSubtask};

    #[test]
    fn normalize_sorts_and_renumbers_densely() {
        let normalized = normalize_blueprint_subtasks(vec![
            TemplateSubtask {
                title: "third".to_string(),
                position: 40,
            },
            TemplateSubtask {
                title: "first".to_string(),
                position: -2,
            },
            TemplateSubtask {
                title: "second".to_string(),
                position: 7,
            },
        ]);

        let titles: Vec<&str> = normalized
            .iter()
            .map(|subtask| subtask.title.as_str())
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
        let positions: Vec<i64> = normalized.iter().map(|subtask| subtask.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn normalize_keeps_relative_order_for_equal_positions() {
        let normalized = normalize_blueprint_subtasks(vec![
            TemplateSubtask {
                title: "a".to_string(),
                position: 1,
            },
            TemplateSubtask {
                title: "b".to_string(),
                position: 1,
            },
        ]);
        assert_eq!(normalized[0].title, "a");
        assert_eq!(normalized[1].title, "b");
    }
}
