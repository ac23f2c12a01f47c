//! Persistence and domain-integrity core for the taskdeck task tracker.
//! This crate is the single source of truth for multi-entity invariants:
//! position contiguity, cascading deletes, cross-entity id remapping and
//! time-zone-correct date arithmetic. Outer layers (HTTP, UI, notification
//! polling) are thin stateless adapters around it.

pub mod civil;
pub mod db;
pub mod logging;
pub mod model;
pub mod recurrence;
pub mod repo;
pub mod service;

pub use civil::{Clock, FixedClock, SystemClock, CIVIL_ZONE};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::snapshot::{Snapshot, SNAPSHOT_VERSION};
pub use model::subtask::{Subtask, SubtaskId, SubtaskValidationError};
pub use model::tag::{Tag, TagId, TagValidationError, FALLBACK_TAG_COLOR};
pub use model::template::{
    Template, TemplateId, TemplateSubtask, TemplateValidationError,
};
pub use model::todo::{
    OwnerId, Priority, RecurrencePattern, Todo, TodoId, TodoValidationError,
    REMINDER_OFFSET_MINUTES,
};
pub use model::ValidationError;
pub use recurrence::{next_occurrence, next_occurrence_str};
pub use repo::subtask_repo::{SqliteSubtaskRepository, SubtaskProgress, SubtaskRepository};
pub use repo::tag_repo::{SqliteTagRepository, TagRepository, TagWithCount};
pub use repo::template_repo::{SqliteTemplateRepository, TemplateRepository};
pub use repo::todo_repo::{
    FieldPatch, SqliteTodoRepository, TodoPatch, TodoRepository,
};
pub use repo::{StoreError, StoreResult};
pub use service::snapshot_service::{ImportOutcome, SnapshotService, TagDecision};
pub use service::template_service::{
    MaterializedTemplate, TemplateDraft, TemplateService, UseTemplateOptions,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
