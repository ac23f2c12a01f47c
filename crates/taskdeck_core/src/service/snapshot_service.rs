//! Export/import reconciler for versioned snapshots.
//!
//! # Responsibility
//! - Serialize one owner's entity graph into the versioned wire format.
//! - Merge a foreign snapshot back into a live store: remap ids, reuse
//!   tags by case-insensitive name, renumber subtasks.
//!
//! # Invariants
//! - Import rejects any version other than the supported one before
//!   touching the store.
//! - The whole import runs inside one immediate transaction.
//! - Unresolvable or malformed entries are skipped and counted, never
//!   fatal; reused tag ids are never reported as created.

use crate::civil::{format_instant, parse_instant, Clock};
use crate::model::snapshot::{
    Snapshot, SnapshotSubtask, SnapshotTag, SnapshotTodo, SnapshotTodoTag, SNAPSHOT_VERSION,
};
use crate::model::subtask::{Subtask, SubtaskId, SUBTASK_TITLE_MAX_CHARS};
use crate::model::tag::{normalize_color, Tag, TagId, FALLBACK_TAG_COLOR, TAG_DESCRIPTION_MAX_CHARS, TAG_NAME_MAX_CHARS};
use crate::model::todo::{OwnerId, Priority, RecurrencePattern, Todo, TodoId, TODO_TITLE_MAX_CHARS, is_supported_reminder_offset};
use crate::repo::subtask_repo::{insert_subtask, renumber_subtasks};
use crate::repo::tag_repo::{attach_link, insert_tag, list_tag_names};
use crate::repo::todo_repo::{insert_todo, SqliteTodoRepository, TodoRepository};
use crate::repo::{parse_instant_ms, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Outcome of one import: only newly-created ids, plus skip counters for
/// caller-side reporting.
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub created_todo_ids: Vec<TodoId>,
    pub created_subtask_ids: Vec<SubtaskId>,
    pub created_tag_ids: Vec<TagId>,
    pub skipped_todos: usize,
    pub skipped_subtasks: usize,
    pub skipped_tags: usize,
    pub skipped_links: usize,
}

/// Reuse-or-create decision for one snapshot tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDecision {
    /// An owner tag with the same case-insensitive name already exists.
    Reuse(TagId),
    /// No name match; a new tag row is required.
    Create,
}

/// Decides whether a snapshot tag maps onto an existing owner tag.
///
/// Comparison is ASCII case-insensitive, matching the engine's NOCASE
/// collation on the name column.
pub fn decide_tag(name: &str, existing: &[(String, TagId)]) -> TagDecision {
    for (existing_name, id) in existing {
        if existing_name.eq_ignore_ascii_case(name) {
            return TagDecision::Reuse(*id);
        }
    }
    TagDecision::Create
}

/// Resolves a foreign reference through the old-id → new-id map.
///
/// Blank or unmapped references resolve to `None`, which callers treat as
/// "skip this entry".
pub fn resolve_ref(map: &HashMap<String, Uuid>, reference: &str) -> Option<Uuid> {
    let key = reference.trim();
    if key.is_empty() {
        return None;
    }
    map.get(key).copied()
}

/// Export/import reconciler over one injected connection.
pub struct SnapshotService<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
}

impl<'a> SnapshotService<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock) -> Self {
        Self { conn, clock }
    }

    /// Serializes the owner's todos, subtasks, tags and links with their
    /// store-local ids.
    pub fn export(&self, owner: OwnerId) -> StoreResult<Snapshot> {
        let todos = SqliteTodoRepository::try_new(self.conn)?.list_for_owner(owner)?;

        let mut snapshot = Snapshot {
            version: SNAPSHOT_VERSION.to_string(),
            generated_at: format_instant(self.clock.now_utc()),
            todos: todos.iter().map(export_todo).collect(),
            subtasks: Vec::new(),
            tags: Vec::new(),
            todo_tags: Vec::new(),
        };

        let mut stmt = self.conn.prepare(
            "SELECT
                s.uuid,
                s.todo_uuid,
                s.title,
                s.position,
                s.is_completed,
                s.created_at,
                s.updated_at
             FROM subtasks s
             INNER JOIN todos t ON t.uuid = s.todo_uuid
             WHERE t.owner_uuid = ?1
             ORDER BY s.todo_uuid ASC, s.position ASC;",
        )?;
        let mut rows = stmt.query([owner.to_string()])?;
        while let Some(row) = rows.next()? {
            let is_completed: i64 = row.get(4)?;
            snapshot.subtasks.push(SnapshotSubtask {
                id: row.get(0)?,
                todo_id: row.get(1)?,
                title: Some(row.get(2)?),
                position: Some(row.get(3)?),
                is_completed: Some(is_completed != 0),
                created_at: export_instant_ms(row.get(5)?)?,
                updated_at: export_instant_ms(row.get(6)?)?,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT uuid, name, color, description, created_at, updated_at
             FROM tags
             WHERE owner_uuid = ?1
             ORDER BY name COLLATE NOCASE ASC, uuid ASC;",
        )?;
        let mut rows = stmt.query([owner.to_string()])?;
        while let Some(row) = rows.next()? {
            snapshot.tags.push(SnapshotTag {
                id: row.get(0)?,
                name: Some(row.get(1)?),
                color: Some(row.get(2)?),
                description: row.get(3)?,
                created_at: export_instant_ms(row.get(4)?)?,
                updated_at: export_instant_ms(row.get(5)?)?,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT tt.todo_uuid, tt.tag_uuid
             FROM todo_tags tt
             INNER JOIN todos t ON t.uuid = tt.todo_uuid
             WHERE t.owner_uuid = ?1
             ORDER BY tt.todo_uuid ASC, tt.tag_uuid ASC;",
        )?;
        let mut rows = stmt.query([owner.to_string()])?;
        while let Some(row) = rows.next()? {
            snapshot.todo_tags.push(SnapshotTodoTag {
                todo_id: row.get(0)?,
                tag_id: row.get(1)?,
            });
        }

        info!(
            "event=snapshot_export module=service status=ok todos={} subtasks={} tags={} links={}",
            snapshot.todos.len(),
            snapshot.subtasks.len(),
            snapshot.tags.len(),
            snapshot.todo_tags.len()
        );
        Ok(snapshot)
    }

    /// Merges a snapshot into the owner's store.
    ///
    /// Tags dedupe by case-insensitive name; todos and subtasks always get
    /// new rows; entries that fail to resolve are skipped.
    pub fn import(&self, owner: OwnerId, snapshot: &Snapshot) -> StoreResult<ImportOutcome> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: snapshot.version.clone(),
                supported: SNAPSHOT_VERSION,
            });
        }

        let now = self.clock.now_utc();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut outcome = ImportOutcome::default();

        let mut tag_map: HashMap<String, Uuid> = HashMap::new();
        let mut known_tags = list_tag_names(&tx, owner)?;
        for entry in &snapshot.tags {
            match import_tag(&tx, owner, entry, &mut known_tags, now)? {
                Some((old_id, new_or_existing, created)) => {
                    tag_map.insert(old_id, new_or_existing);
                    if created {
                        outcome.created_tag_ids.push(new_or_existing);
                    }
                }
                None => outcome.skipped_tags += 1,
            }
        }

        let mut todo_map: HashMap<String, Uuid> = HashMap::new();
        for entry in &snapshot.todos {
            match import_todo(&tx, owner, entry, now)? {
                Some((old_id, new_id)) => {
                    todo_map.insert(old_id, new_id);
                    outcome.created_todo_ids.push(new_id);
                }
                None => outcome.skipped_todos += 1,
            }
        }

        let mut touched_parents: BTreeSet<Uuid> = BTreeSet::new();
        for (index, entry) in snapshot.subtasks.iter().enumerate() {
            match import_subtask(&tx, entry, &todo_map, index, now)? {
                Some((parent, new_id)) => {
                    touched_parents.insert(parent);
                    outcome.created_subtask_ids.push(new_id);
                }
                None => outcome.skipped_subtasks += 1,
            }
        }
        for parent in &touched_parents {
            renumber_subtasks(&tx, *parent)?;
        }

        for entry in &snapshot.todo_tags {
            match (
                resolve_ref(&todo_map, &entry.todo_id),
                resolve_ref(&tag_map, &entry.tag_id),
            ) {
                (Some(todo_id), Some(tag_id)) => attach_link(&tx, todo_id, tag_id)?,
                _ => outcome.skipped_links += 1,
            }
        }

        tx.commit()?;

        info!(
            "event=snapshot_import module=service status=ok todos={} subtasks={} tags={} skipped_todos={} skipped_subtasks={} skipped_tags={} skipped_links={}",
            outcome.created_todo_ids.len(),
            outcome.created_subtask_ids.len(),
            outcome.created_tag_ids.len(),
            outcome.skipped_todos,
            outcome.skipped_subtasks,
            outcome.skipped_tags,
            outcome.skipped_links
        );
        Ok(outcome)
    }
}

fn export_todo(todo: &Todo) -> SnapshotTodo {
    SnapshotTodo {
        id: todo.uuid.to_string(),
        title: Some(todo.title.clone()),
        description: Some(todo.description.clone()),
        priority: Some(todo.priority.as_db_str().to_string()),
        due_date: todo.due_at.map(format_instant),
        is_completed: Some(todo.is_completed),
        completed_at: todo.completed_at.map(format_instant),
        is_recurring: Some(todo.is_recurring),
        recurrence_pattern: todo
            .recurrence_pattern
            .map(|pattern| pattern.as_db_str().to_string()),
        reminder_minutes: todo.reminder_minutes,
        last_notification_sent: todo.last_notified_at.map(format_instant),
        created_at: Some(format_instant(todo.created_at)),
        updated_at: Some(format_instant(todo.updated_at)),
    }
}

fn export_instant_ms(epoch_ms: i64) -> StoreResult<Option<String>> {
    Ok(Some(format_instant(parse_instant_ms(
        epoch_ms,
        "subtasks/tags instant",
    )?)))
}

/// Imports one snapshot tag: reuse by name, or create with a sanitized
/// color. Returns `(old id, mapped id, created)` or `None` to skip.
fn import_tag(
    conn: &Connection,
    owner: OwnerId,
    entry: &SnapshotTag,
    known_tags: &mut Vec<(String, TagId)>,
    now: DateTime<Utc>,
) -> StoreResult<Option<(String, TagId, bool)>> {
    let old_id = entry.id.trim();
    if old_id.is_empty() {
        warn!("event=snapshot_import module=service status=skip entity=tag reason=missing_id");
        return Ok(None);
    }

    let name = match entry.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() && name.chars().count() <= TAG_NAME_MAX_CHARS => name,
        _ => {
            warn!("event=snapshot_import module=service status=skip entity=tag reason=bad_name");
            return Ok(None);
        }
    };

    if let TagDecision::Reuse(existing) = decide_tag(name, known_tags) {
        return Ok(Some((old_id.to_string(), existing, false)));
    }

    let color = entry
        .color
        .as_deref()
        .and_then(normalize_color)
        .unwrap_or_else(|| FALLBACK_TAG_COLOR.to_string());
    let description = entry
        .description
        .clone()
        .filter(|value| value.chars().count() <= TAG_DESCRIPTION_MAX_CHARS);

    let mut tag = Tag::new(owner, name, color, now);
    tag.description = description;
    if let Some(created_at) = entry.created_at.as_deref().and_then(parse_instant) {
        tag.created_at = created_at;
    }
    if let Some(updated_at) = entry.updated_at.as_deref().and_then(parse_instant) {
        tag.updated_at = updated_at;
    }
    if let Err(err) = tag.validate() {
        warn!(
            "event=snapshot_import module=service status=skip entity=tag reason=validation error={err}"
        );
        return Ok(None);
    }

    insert_tag(conn, &tag)?;
    known_tags.push((tag.name.clone(), tag.uuid));
    Ok(Some((old_id.to_string(), tag.uuid, true)))
}

/// Imports one snapshot todo as a brand-new row. Returns
/// `(old id, new id)` or `None` to skip.
fn import_todo(
    conn: &Connection,
    owner: OwnerId,
    entry: &SnapshotTodo,
    now: DateTime<Utc>,
) -> StoreResult<Option<(String, TodoId)>> {
    let old_id = entry.id.trim();
    if old_id.is_empty() {
        warn!("event=snapshot_import module=service status=skip entity=todo reason=missing_id");
        return Ok(None);
    }

    let title = match entry.title.as_deref() {
        Some(title) if !title.trim().is_empty() && title.chars().count() <= TODO_TITLE_MAX_CHARS => {
            title
        }
        _ => {
            warn!("event=snapshot_import module=service status=skip entity=todo reason=bad_title");
            return Ok(None);
        }
    };

    let priority = match entry.priority.as_deref() {
        None => Priority::Medium,
        Some(value) => match Priority::parse(value) {
            Some(priority) => priority,
            None => {
                warn!(
                    "event=snapshot_import module=service status=skip entity=todo reason=bad_priority"
                );
                return Ok(None);
            }
        },
    };

    let due_at = entry.due_date.as_deref().and_then(parse_instant);

    // Best-effort repair: recurrence and reminder fields cannot outlive a
    // missing due instant, so drop them instead of skipping the row.
    let pattern = entry
        .recurrence_pattern
        .as_deref()
        .and_then(RecurrencePattern::parse);
    let is_recurring =
        entry.is_recurring.unwrap_or(false) && pattern.is_some() && due_at.is_some();
    let recurrence_pattern = if due_at.is_some() { pattern } else { None };
    let reminder_minutes = entry
        .reminder_minutes
        .filter(|minutes| is_supported_reminder_offset(*minutes))
        .filter(|_| due_at.is_some());

    let is_completed = entry.is_completed.unwrap_or(false);
    let completed_at = if is_completed {
        Some(
            entry
                .completed_at
                .as_deref()
                .and_then(parse_instant)
                .unwrap_or(now),
        )
    } else {
        None
    };

    let mut todo = Todo::new(owner, title, now);
    todo.description = entry.description.clone().unwrap_or_default();
    todo.priority = priority;
    todo.due_at = due_at;
    todo.is_completed = is_completed;
    todo.completed_at = completed_at;
    todo.is_recurring = is_recurring;
    todo.recurrence_pattern = recurrence_pattern;
    todo.reminder_minutes = reminder_minutes;
    todo.last_notified_at = entry
        .last_notification_sent
        .as_deref()
        .and_then(parse_instant);
    if let Some(created_at) = entry.created_at.as_deref().and_then(parse_instant) {
        todo.created_at = created_at;
    }
    if let Some(updated_at) = entry.updated_at.as_deref().and_then(parse_instant) {
        todo.updated_at = updated_at;
    }

    if let Err(err) = todo.validate() {
        warn!(
            "event=snapshot_import module=service status=skip entity=todo reason=validation error={err}"
        );
        return Ok(None);
    }

    insert_todo(conn, &todo)?;
    Ok(Some((old_id.to_string(), todo.uuid)))
}

/// Imports one snapshot subtask under its remapped parent. Returns
/// `(parent id, new id)` or `None` to skip.
fn import_subtask(
    conn: &Connection,
    entry: &SnapshotSubtask,
    todo_map: &HashMap<String, Uuid>,
    index: usize,
    now: DateTime<Utc>,
) -> StoreResult<Option<(TodoId, SubtaskId)>> {
    let parent = match resolve_ref(todo_map, &entry.todo_id) {
        Some(parent) => parent,
        None => {
            warn!(
                "event=snapshot_import module=service status=skip entity=subtask reason=unmapped_parent"
            );
            return Ok(None);
        }
    };

    let title = match entry.title.as_deref() {
        Some(title)
            if !title.trim().is_empty() && title.chars().count() <= SUBTASK_TITLE_MAX_CHARS =>
        {
            title
        }
        _ => {
            warn!(
                "event=snapshot_import module=service status=skip entity=subtask reason=bad_title"
            );
            return Ok(None);
        }
    };

    // Entries without a usable position sort after every real one; the
    // per-parent renumbering pass makes the sequence dense again.
    let interim_position = entry
        .position
        .filter(|position| *position >= 1)
        .unwrap_or(1_000_000 + index as i64);

    let mut subtask = Subtask::new(parent, title, interim_position, now);
    subtask.is_completed = entry.is_completed.unwrap_or(false);
    if let Some(created_at) = entry.created_at.as_deref().and_then(parse_instant) {
        subtask.created_at = created_at;
    }
    if let Some(updated_at) = entry.updated_at.as_deref().and_then(parse_instant) {
        subtask.updated_at = updated_at;
    }
    if let Err(err) = subtask.validate() {
        warn!(
            "event=snapshot_import module=service status=skip entity=subtask reason=validation error={err}"
        );
        return Ok(None);
    }

    insert_subtask(conn, &subtask)?;
    Ok(Some((parent, subtask.uuid)))
}

#[cfg(test)]
mod tests {
    use super::{decide_tag, resolve_ref, TagDecision};
    use std::collections::HashMap;
    use uuid::Uuid;

    #[test]
    fn decide_tag_reuses_case_insensitive_name_match() {
        let work = Uuid::new_v4();
        let existing = vec![("Work".to_string(), work)];

        assert_eq!(decide_tag("work", &existing), TagDecision::Reuse(work));
        assert_eq!(decide_tag("WORK", &existing), TagDecision::Reuse(work));
        assert_eq!(decide_tag("Home", &existing), TagDecision::Create);
    }

    #[test]
    fn resolve_ref_defaults_to_skip() {
        let mapped = Uuid::new_v4();
        let mut map = HashMap::new();
        map.insert("old-1".to_string(), mapped);

        assert_eq!(resolve_ref(&map, "old-1"), Some(mapped));
        assert_eq!(resolve_ref(&map, " old-1 "), Some(mapped));
        assert_eq!(resolve_ref(&map, "old-2"), None);
        assert_eq!(resolve_ref(&map, ""), None);
        assert_eq!(resolve_ref(&map, "   "), None);
    }
}
