//! Domain model for the task-tracking core.
//!
//! # Responsibility
//! - Define canonical entity records, enumerated fields and their
//!   validation rules.
//! - Keep every cross-field invariant in one place so repositories can
//!   enforce it on the write path.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID and scoped to an owner.
//! - Write paths call `validate()` before any SQL mutation.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod snapshot;
pub mod subtask;
pub mod tag;
pub mod template;
pub mod todo;

use subtask::SubtaskValidationError;
use tag::TagValidationError;
use template::TemplateValidationError;
use todo::TodoValidationError;

/// Sum of the per-entity validation errors, carried by the store error
/// taxonomy so callers always get a user-presentable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Todo(TodoValidationError),
    Tag(TagValidationError),
    Subtask(SubtaskValidationError),
    Template(TemplateValidationError),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo(err) => write!(f, "{err}"),
            Self::Tag(err) => write!(f, "{err}"),
            Self::Subtask(err) => write!(f, "{err}"),
            Self::Template(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Todo(err) => Some(err),
            Self::Tag(err) => Some(err),
            Self::Subtask(err) => Some(err),
            Self::Template(err) => Some(err),
        }
    }
}

impl From<TodoValidationError> for ValidationError {
    fn from(value: TodoValidationError) -> Self {
        Self::Todo(value)
    }
}

impl From<TagValidationError> for ValidationError {
    fn from(value: TagValidationError) -> Self {
        Self::Tag(value)
    }
}

impl From<SubtaskValidationError> for ValidationError {
    fn from(value: SubtaskValidationError) -> Self {
        Self::Subtask(value)
    }
}

impl From<TemplateValidationError> for ValidationError {
    fn from(value: TemplateValidationError) -> Self {
        Self::Template(value)
    }
}
