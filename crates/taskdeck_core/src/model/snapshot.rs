//! Versioned snapshot wire model for export/import.
//!
//! # Responsibility
//! - Mirror the external snapshot JSON schema field for field.
//! - Stay lenient on read: foreign snapshots may carry malformed ids,
//!   missing fields or unknown enum strings; the reconciler decides what to
//!   repair and what to skip.
//!
//! # Invariants
//! - `version` gates import; there is no cross-version migration.
//! - Ids are opaque strings on the wire, instants are RFC3339.

use serde::{Deserialize, Serialize};

/// The only snapshot format version this build reads or writes.
pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: String,
    pub generated_at: String,
    #[serde(default)]
    pub todos: Vec<SnapshotTodo>,
    #[serde(default)]
    pub subtasks: Vec<SnapshotSubtask>,
    #[serde(default)]
    pub tags: Vec<SnapshotTag>,
    #[serde(default)]
    pub todo_tags: Vec<SnapshotTodoTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTodo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub is_completed: Option<bool>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub is_recurring: Option<bool>,
    #[serde(default)]
    pub recurrence_pattern: Option<String>,
    #[serde(default)]
    pub reminder_minutes: Option<i64>,
    #[serde(default)]
    pub last_notification_sent: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSubtask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub todo_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub is_completed: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTag {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTodoTag {
    #[serde(default)]
    pub todo_id: String,
    #[serde(default)]
    pub tag_id: String,
}

#[cfg(test)]
mod tests {
    use super::{Snapshot, SNAPSHOT_VERSION};

    #[test]
    fn snapshot_tolerates_missing_sections_and_fields() {
        let parsed: Snapshot = serde_json::from_str(
            r#"{
                "version": "1.0",
                "generatedAt": "2026-02-01T00:00:00.000Z",
                "todos": [{"id": "t-1"}]
            }"#,
        )
        .unwrap();

        assert_eq!(parsed.version, SNAPSHOT_VERSION);
        assert_eq!(parsed.todos.len(), 1);
        assert_eq!(parsed.todos[0].id, "t-1");
        assert!(parsed.todos[0].title.is_none());
        assert!(parsed.subtasks.is_empty());
        assert!(parsed.tags.is_empty());
        assert!(parsed.todo_tags.is_empty());
    }

    #[test]
    fn snapshot_uses_camel_case_wire_names() {
        let parsed: Snapshot = serde_json::from_str(
            r#"{
                "version": "1.0",
                "generatedAt": "2026-02-01T00:00:00.000Z",
                "todos": [{
                    "id": "t-1",
                    "dueDate": "2026-02-02T09:00:00.000Z",
                    "isCompleted": true,
                    "lastNotificationSent": "2026-02-01T08:00:00.000Z"
                }],
                "todoTags": [{"todoId": "t-1", "tagId": "g-1"}]
            }"#,
        )
        .unwrap();

        assert_eq!(
            parsed.todos[0].due_date.as_deref(),
            Some("2026-02-02T09:00:00.000Z")
        );
        assert_eq!(parsed.todos[0].is_completed, Some(true));
        assert_eq!(parsed.todo_tags[0].todo_id, "t-1");
        assert_eq!(parsed.todo_tags[0].tag_id, "g-1");
    }
}
