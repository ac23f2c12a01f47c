//! Todo domain model.
//!
//! # Responsibility
//! - Define the canonical todo record and its enumerated fields.
//! - Enforce the cross-field invariants every write path must satisfy.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another todo.
//! - Recurring todos carry both a pattern and a due instant.
//! - A reminder offset is only meaningful with a due instant and must come
//!   from the fixed offset whitelist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a todo row.
pub type TodoId = Uuid;

/// Opaque authenticated owner identity supplied by the session resolver.
pub type OwnerId = Uuid;

pub const TODO_TITLE_MAX_CHARS: usize = 200;
pub const TODO_DESCRIPTION_MAX_CHARS: usize = 2000;

/// Reminder offsets (minutes before the due instant) accepted by the store,
/// from at-time through one week.
pub const REMINDER_OFFSET_MINUTES: [i64; 10] = [0, 5, 10, 15, 30, 60, 120, 1440, 2880, 10080];

/// Returns whether `minutes` is a member of the reminder offset whitelist.
pub fn is_supported_reminder_offset(minutes: i64) -> bool {
    REMINDER_OFFSET_MINUTES.contains(&minutes)
}

/// Todo urgency level, ordered high before medium before low in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    /// Sort rank used by the canonical listing order (lower sorts first).
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Automatic next-instance cadence for recurring todos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrencePattern {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }
}

/// Canonical todo record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Stable global ID used for linking and snapshot remapping.
    pub uuid: TodoId,
    /// Owning user; every query is scoped by it.
    pub owner_uuid: OwnerId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    /// UTC due instant; date-only reasoning happens in the civil zone.
    pub due_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    /// Minutes before `due_at` at which the external notifier should fire.
    pub reminder_minutes: Option<i64>,
    /// Set by the notifier write-back; cleared whenever the todo reopens.
    pub last_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// Creates a new incomplete, medium-priority todo.
    pub fn new(owner_uuid: OwnerId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            owner_uuid,
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            due_at: None,
            is_completed: false,
            completed_at: None,
            is_recurring: false,
            recurrence_pattern: None,
            reminder_minutes: None,
            last_notified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks every field-level and cross-field invariant.
    pub fn validate(&self) -> Result<(), TodoValidationError> {
        let title_chars = self.title.chars().count();
        if self.title.trim().is_empty() {
            return Err(TodoValidationError::EmptyTitle);
        }
        if title_chars > TODO_TITLE_MAX_CHARS {
            return Err(TodoValidationError::TitleTooLong { chars: title_chars });
        }
        let description_chars = self.description.chars().count();
        if description_chars > TODO_DESCRIPTION_MAX_CHARS {
            return Err(TodoValidationError::DescriptionTooLong {
                chars: description_chars,
            });
        }
        if self.is_recurring {
            if self.recurrence_pattern.is_none() {
                return Err(TodoValidationError::RecurringWithoutPattern);
            }
            if self.due_at.is_none() {
                return Err(TodoValidationError::RecurringWithoutDue);
            }
        }
        if let Some(minutes) = self.reminder_minutes {
            if self.due_at.is_none() {
                return Err(TodoValidationError::ReminderWithoutDue);
            }
            if !is_supported_reminder_offset(minutes) {
                return Err(TodoValidationError::UnsupportedReminderOffset { minutes });
            }
        }
        Ok(())
    }
}

/// Field-level validation failures for todo writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoValidationError {
    EmptyTitle,
    TitleTooLong { chars: usize },
    DescriptionTooLong { chars: usize },
    RecurringWithoutPattern,
    RecurringWithoutDue,
    ReminderWithoutDue,
    UnsupportedReminderOffset { minutes: i64 },
    /// Recurrence chaining was requested for a non-recurring todo.
    NotRecurring,
}

impl Display for TodoValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "todo title must not be empty"),
            Self::TitleTooLong { chars } => write!(
                f,
                "todo title has {chars} characters, maximum is {TODO_TITLE_MAX_CHARS}"
            ),
            Self::DescriptionTooLong { chars } => write!(
                f,
                "todo description has {chars} characters, maximum is {TODO_DESCRIPTION_MAX_CHARS}"
            ),
            Self::RecurringWithoutPattern => {
                write!(f, "recurring todo requires a recurrence pattern")
            }
            Self::RecurringWithoutDue => write!(f, "recurring todo requires a due instant"),
            Self::ReminderWithoutDue => write!(f, "reminder offset requires a due instant"),
            Self::UnsupportedReminderOffset { minutes } => {
                write!(f, "reminder offset {minutes} is not a supported value")
            }
            Self::NotRecurring => write!(f, "todo is not recurring"),
        }
    }
}

impl Error for TodoValidationError {}
