//! Subtask repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Own ordered subtasks per todo and the progress projection.
//! - Keep positions dense: renumbering runs after every structural change.
//!
//! # Invariants
//! - Positions for a given todo are always exactly {1..N}, no duplicates or
//!   gaps.
//! - Insert positions clamp to [1, count + 1]; an omitted position appends.
//! - `progress` never divides by zero: an empty set reports 0 percent.

use crate::civil::to_epoch_ms;
use crate::model::subtask::{Subtask, SubtaskId};
use crate::model::todo::{OwnerId, TodoId};
use crate::repo::todo_repo::todo_exists;
use crate::repo::{
    ensure_connection_ready, flag_to_int, parse_flag, parse_instant_ms, parse_uuid, StoreError,
    StoreResult,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const SUBTASK_SELECT_SQL: &str = "SELECT
    uuid,
    todo_uuid,
    title,
    position,
    is_completed,
    created_at,
    updated_at
FROM subtasks";

/// Completion summary for one todo's subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtaskProgress {
    pub completed: i64,
    pub total: i64,
    /// round(100 * completed / total); 0 when there are no subtasks.
    pub percent: i64,
}

/// Repository interface for subtask operations.
pub trait SubtaskRepository {
    /// Inserts a subtask, shifting followers up when a position is given.
    fn create_subtask(
        &self,
        owner: OwnerId,
        todo_id: TodoId,
        title: &str,
        position: Option<i64>,
    ) -> StoreResult<Subtask>;
    /// Removes one subtask and renumbers the parent's survivors densely.
    fn delete_subtask(&self, owner: OwnerId, id: SubtaskId) -> StoreResult<()>;
    /// Flips completion and returns the refreshed progress.
    fn toggle_completion(&self, owner: OwnerId, id: SubtaskId) -> StoreResult<SubtaskProgress>;
    /// Replaces the title and returns the refreshed progress.
    fn update_title(
        &self,
        owner: OwnerId,
        id: SubtaskId,
        title: &str,
    ) -> StoreResult<SubtaskProgress>;
    /// Lists subtasks of one owned todo in position order.
    fn list_for_todo(&self, owner: OwnerId, todo_id: TodoId) -> StoreResult<Vec<Subtask>>;
    /// Computes the completion summary for one owned todo.
    fn progress(&self, owner: OwnerId, todo_id: TodoId) -> StoreResult<SubtaskProgress>;
}

/// SQLite-backed subtask repository over an injected connection.
pub struct SqliteSubtaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubtaskRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                (
                    "subtasks",
                    &[
                        "uuid",
                        "todo_uuid",
                        "title",
                        "position",
                        "is_completed",
                        "created_at",
                        "updated_at",
                    ],
                ),
                ("todos", &["uuid", "owner_uuid"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl SubtaskRepository for SqliteSubtaskRepository<'_> {
    fn create_subtask(
        &self,
        owner: OwnerId,
        todo_id: TodoId,
        title: &str,
        position: Option<i64>,
    ) -> StoreResult<Subtask> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !todo_exists(&tx, owner, todo_id)? {
            return Err(StoreError::NotFound {
                entity: "todo",
                id: todo_id,
            });
        }

        let count = subtask_count(&tx, todo_id)?;
        let target = position
            .unwrap_or(count + 1)
            .clamp(1, count + 1);

        // Make room: everything at or after the target slot moves up one.
        tx.execute(
            "UPDATE subtasks
             SET position = position + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE todo_uuid = ?1
               AND position >= ?2;",
            params![todo_id.to_string(), target],
        )?;

        let subtask = Subtask::new(todo_id, title, target, Utc::now());
        subtask.validate()?;
        insert_subtask(&tx, &subtask)?;

        let created = load_subtask_by_id(&tx, subtask.uuid)?.ok_or_else(|| {
            StoreError::InvalidData("created subtask missing on read-back".to_string())
        })?;
        tx.commit()?;
        Ok(created)
    }

    fn delete_subtask(&self, owner: OwnerId, id: SubtaskId) -> StoreResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let todo_id = owned_subtask_parent(&tx, owner, id)?.ok_or(StoreError::NotFound {
            entity: "subtask",
            id,
        })?;

        tx.execute("DELETE FROM subtasks WHERE uuid = ?1;", [id.to_string()])?;
        renumber_subtasks(&tx, todo_id)?;
        tx.commit()?;
        Ok(())
    }

    fn toggle_completion(&self, owner: OwnerId, id: SubtaskId) -> StoreResult<SubtaskProgress> {
        let todo_id = owned_subtask_parent(self.conn, owner, id)?.ok_or(StoreError::NotFound {
            entity: "subtask",
            id,
        })?;
        self.conn.execute(
            "UPDATE subtasks
             SET is_completed = CASE is_completed WHEN 0 THEN 1 ELSE 0 END,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        subtask_progress(self.conn, todo_id)
    }

    fn update_title(
        &self,
        owner: OwnerId,
        id: SubtaskId,
        title: &str,
    ) -> StoreResult<SubtaskProgress> {
        let todo_id = owned_subtask_parent(self.conn, owner, id)?.ok_or(StoreError::NotFound {
            entity: "subtask",
            id,
        })?;

        // Position 1 placeholder: only the title rules are of interest here.
        let probe = Subtask::new(todo_id, title, 1, Utc::now());
        probe.validate()?;

        self.conn.execute(
            "UPDATE subtasks
             SET title = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![title, id.to_string()],
        )?;
        subtask_progress(self.conn, todo_id)
    }

    fn list_for_todo(&self, owner: OwnerId, todo_id: TodoId) -> StoreResult<Vec<Subtask>> {
        if !todo_exists(self.conn, owner, todo_id)? {
            return Err(StoreError::NotFound {
                entity: "todo",
                id: todo_id,
            });
        }
        let sql = format!(
            "{SUBTASK_SELECT_SQL} WHERE todo_uuid = ?1 ORDER BY position ASC, uuid ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([todo_id.to_string()])?;
        let mut subtasks = Vec::new();
        while let Some(row) = rows.next()? {
            subtasks.push(parse_subtask_row(row)?);
        }
        Ok(subtasks)
    }

    fn progress(&self, owner: OwnerId, todo_id: TodoId) -> StoreResult<SubtaskProgress> {
        if !todo_exists(self.conn, owner, todo_id)? {
            return Err(StoreError::NotFound {
                entity: "todo",
                id: todo_id,
            });
        }
        subtask_progress(self.conn, todo_id)
    }
}

/// Inserts one subtask row. Shared with the template engine and reconciler.
pub(crate) fn insert_subtask(conn: &Connection, subtask: &Subtask) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO subtasks (
            uuid,
            todo_uuid,
            title,
            position,
            is_completed,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            subtask.uuid.to_string(),
            subtask.todo_uuid.to_string(),
            subtask.title,
            subtask.position,
            flag_to_int(subtask.is_completed),
            to_epoch_ms(subtask.created_at),
            to_epoch_ms(subtask.updated_at),
        ],
    )?;
    Ok(())
}

/// Rewrites the parent's positions to a dense 1..N sequence preserving
/// relative order. Mandatory after every structural change.
pub(crate) fn renumber_subtasks(conn: &Connection, todo_id: TodoId) -> StoreResult<()> {
    let mut stmt = conn.prepare(
        "SELECT uuid
         FROM subtasks
         WHERE todo_uuid = ?1
         ORDER BY position ASC, rowid ASC;",
    )?;
    let mut rows = stmt.query([todo_id.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let uuid_text: String = row.get(0)?;
        ids.push(uuid_text);
    }

    for (index, uuid_text) in ids.into_iter().enumerate() {
        conn.execute(
            "UPDATE subtasks
             SET position = ?1
             WHERE uuid = ?2
               AND position <> ?1;",
            params![index as i64 + 1, uuid_text],
        )?;
    }
    Ok(())
}

/// Computes the completion summary for one todo.
pub(crate) fn subtask_progress(conn: &Connection, todo_id: TodoId) -> StoreResult<SubtaskProgress> {
    let (completed, total): (i64, i64) = conn.query_row(
        "SELECT
            COALESCE(SUM(is_completed), 0),
            COUNT(*)
         FROM subtasks
         WHERE todo_uuid = ?1;",
        [todo_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let percent = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as i64
    };
    Ok(SubtaskProgress {
        completed,
        total,
        percent,
    })
}

fn subtask_count(conn: &Connection, todo_id: TodoId) -> StoreResult<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subtasks WHERE todo_uuid = ?1;",
        [todo_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Resolves a subtask to its parent todo id, scoped to the owner.
fn owned_subtask_parent(
    conn: &Connection,
    owner: OwnerId,
    id: SubtaskId,
) -> StoreResult<Option<TodoId>> {
    let parent: Option<String> = conn
        .query_row(
            "SELECT s.todo_uuid
             FROM subtasks s
             INNER JOIN todos t ON t.uuid = s.todo_uuid
             WHERE s.uuid = ?1
               AND t.owner_uuid = ?2;",
            params![id.to_string(), owner.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    parent
        .map(|value| parse_uuid(&value, "subtasks.todo_uuid"))
        .transpose()
}

fn load_subtask_by_id(conn: &Connection, id: SubtaskId) -> StoreResult<Option<Subtask>> {
    let sql = format!("{SUBTASK_SELECT_SQL} WHERE uuid = ?1;");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_subtask_row(row)?));
    }
    Ok(None)
}

fn parse_subtask_row(row: &Row<'_>) -> StoreResult<Subtask> {
    let uuid_text: String = row.get("uuid")?;
    let todo_text: String = row.get("todo_uuid")?;
    Ok(Subtask {
        uuid: parse_uuid(&uuid_text, "subtasks.uuid")?,
        todo_uuid: parse_uuid(&todo_text, "subtasks.todo_uuid")?,
        title: row.get("title")?,
        position: row.get("position")?,
        is_completed: parse_flag(row.get("is_completed")?, "subtasks.is_completed")?,
        created_at: parse_instant_ms(row.get("created_at")?, "subtasks.created_at")?,
        updated_at: parse_instant_ms(row.get("updated_at")?, "subtasks.updated_at")?,
    })
}
