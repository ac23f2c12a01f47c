//! Todo repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Own todo CRUD, the canonical listing order and reminder-candidate
//!   queries.
//! - Enforce cascading clears on partial updates and cascading deletes
//!   across subtasks and tag links.
//!
//! # Invariants
//! - Write paths call `Todo::validate()` before SQL mutations.
//! - `list_for_owner` ordering is the single source of truth: completion,
//!   then priority rank, then due instant (absent last), then creation
//!   instant, with the id as final tiebreak.
//! - Clearing the due instant also clears reminder offset, recurrence
//!   flag/pattern and the last-notified instant.

use crate::civil::to_epoch_ms;
use crate::model::todo::{OwnerId, Priority, RecurrencePattern, Todo, TodoId, TodoValidationError};
use crate::recurrence::next_occurrence;
use crate::repo::{
    ensure_connection_ready, flag_to_int, parse_flag, parse_instant_ms, parse_opt_instant_ms,
    parse_uuid, StoreError, StoreResult,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const TODO_SELECT_SQL: &str = "SELECT
    uuid,
    owner_uuid,
    title,
    description,
    priority,
    due_at,
    is_completed,
    completed_at,
    is_recurring,
    recurrence_pattern,
    reminder_minutes,
    last_notified_at,
    created_at,
    updated_at
FROM todos";

/// Canonical listing order (see module invariants).
const TODO_ORDER_SQL: &str = "ORDER BY
    is_completed ASC,
    CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END ASC,
    (due_at IS NULL) ASC,
    due_at ASC,
    created_at ASC,
    uuid ASC";

/// Tri-state field update: leave untouched, clear, or replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPatch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for FieldPatch<T> {
    fn default() -> Self {
        Self::Keep
    }
}

/// Partial update for one todo. Absent fields keep their stored value; an
/// explicit `Clear` removes the value (with cascading clears for the due
/// instant).
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_at: FieldPatch<chrono::DateTime<chrono::Utc>>,
    pub is_recurring: Option<bool>,
    pub recurrence_pattern: FieldPatch<RecurrencePattern>,
    pub reminder_minutes: FieldPatch<i64>,
}

/// Repository interface for todo operations.
pub trait TodoRepository {
    /// Persists one validated todo and returns its stable id.
    fn create_todo(&self, todo: &Todo) -> StoreResult<TodoId>;
    /// Loads one todo scoped to its owner.
    fn get_todo(&self, owner: OwnerId, id: TodoId) -> StoreResult<Option<Todo>>;
    /// Lists all todos of one owner in the canonical order.
    fn list_for_owner(&self, owner: OwnerId) -> StoreResult<Vec<Todo>>;
    /// Lists incomplete todos carrying both a due instant and a reminder
    /// offset, for the external notifier.
    fn list_reminder_candidates(&self, owner: OwnerId) -> StoreResult<Vec<Todo>>;
    /// Applies a partial update and returns the refreshed row.
    fn update_todo(&self, owner: OwnerId, id: TodoId, patch: &TodoPatch) -> StoreResult<Todo>;
    /// Deletes one todo together with its subtasks and tag links.
    fn delete_todo(&self, owner: OwnerId, id: TodoId) -> StoreResult<()>;
    /// Sets or clears completion; reopening always clears last-notified so
    /// a reopened todo can remind again.
    fn toggle_complete(&self, owner: OwnerId, id: TodoId, completed: bool) -> StoreResult<Todo>;
    /// Advances a recurring todo to its next occurrence and reopens it, in
    /// one transaction.
    fn advance_recurrence(&self, owner: OwnerId, id: TodoId) -> StoreResult<Todo>;
    /// Notifier write-back for the last-notified instant.
    fn mark_notified(
        &self,
        owner: OwnerId,
        id: TodoId,
        instant: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<()>;
}

/// SQLite-backed todo repository over an injected connection.
pub struct SqliteTodoRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTodoRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                (
                    "todos",
                    &[
                        "uuid",
                        "owner_uuid",
                        "title",
                        "description",
                        "priority",
                        "due_at",
                        "is_completed",
                        "completed_at",
                        "is_recurring",
                        "recurrence_pattern",
                        "reminder_minutes",
                        "last_notified_at",
                        "created_at",
                        "updated_at",
                    ],
                ),
                ("subtasks", &["uuid", "todo_uuid", "position"]),
                ("todo_tags", &["todo_uuid", "tag_uuid"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl TodoRepository for SqliteTodoRepository<'_> {
    fn create_todo(&self, todo: &Todo) -> StoreResult<TodoId> {
        todo.validate()?;
        insert_todo(self.conn, todo)?;
        Ok(todo.uuid)
    }

    fn get_todo(&self, owner: OwnerId, id: TodoId) -> StoreResult<Option<Todo>> {
        load_todo(self.conn, owner, id)
    }

    fn list_for_owner(&self, owner: OwnerId) -> StoreResult<Vec<Todo>> {
        let sql = format!("{TODO_SELECT_SQL} WHERE owner_uuid = ?1 {TODO_ORDER_SQL};");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([owner.to_string()])?;
        let mut todos = Vec::new();
        while let Some(row) = rows.next()? {
            todos.push(parse_todo_row(row)?);
        }
        Ok(todos)
    }

    fn list_reminder_candidates(&self, owner: OwnerId) -> StoreResult<Vec<Todo>> {
        let sql = format!(
            "{TODO_SELECT_SQL}
             WHERE owner_uuid = ?1
               AND is_completed = 0
               AND due_at IS NOT NULL
               AND reminder_minutes IS NOT NULL
             ORDER BY due_at ASC, uuid ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([owner.to_string()])?;
        let mut todos = Vec::new();
        while let Some(row) = rows.next()? {
            todos.push(parse_todo_row(row)?);
        }
        Ok(todos)
    }

    fn update_todo(&self, owner: OwnerId, id: TodoId, patch: &TodoPatch) -> StoreResult<Todo> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut todo = load_todo(&tx, owner, id)?.ok_or(StoreError::NotFound {
            entity: "todo",
            id,
        })?;

        if let Some(title) = &patch.title {
            todo.title = title.clone();
        }
        if let Some(description) = &patch.description {
            todo.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            todo.priority = priority;
        }
        match &patch.due_at {
            FieldPatch::Keep => {}
            FieldPatch::Set(due) => todo.due_at = Some(*due),
            FieldPatch::Clear => {
                // Dependent fields cannot outlive the due instant.
                todo.due_at = None;
                todo.reminder_minutes = None;
                todo.is_recurring = false;
                todo.recurrence_pattern = None;
                todo.last_notified_at = None;
            }
        }
        if let Some(is_recurring) = patch.is_recurring {
            todo.is_recurring = is_recurring;
        }
        match &patch.recurrence_pattern {
            FieldPatch::Keep => {}
            FieldPatch::Set(pattern) => todo.recurrence_pattern = Some(*pattern),
            FieldPatch::Clear => todo.recurrence_pattern = None,
        }
        match &patch.reminder_minutes {
            FieldPatch::Keep => {}
            FieldPatch::Set(minutes) => todo.reminder_minutes = Some(*minutes),
            FieldPatch::Clear => todo.reminder_minutes = None,
        }

        todo.validate()?;

        let changed = tx.execute(
            "UPDATE todos
             SET
                title = ?1,
                description = ?2,
                priority = ?3,
                due_at = ?4,
                is_recurring = ?5,
                recurrence_pattern = ?6,
                reminder_minutes = ?7,
                last_notified_at = ?8,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?9
               AND owner_uuid = ?10;",
            params![
                todo.title,
                todo.description,
                todo.priority.as_db_str(),
                todo.due_at.map(to_epoch_ms),
                flag_to_int(todo.is_recurring),
                todo.recurrence_pattern.map(RecurrencePattern::as_db_str),
                todo.reminder_minutes,
                todo.last_notified_at.map(to_epoch_ms),
                id.to_string(),
                owner.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "todo",
                id,
            });
        }

        let refreshed = load_todo(&tx, owner, id)?.ok_or_else(|| {
            StoreError::InvalidData("updated todo missing on read-back".to_string())
        })?;
        tx.commit()?;
        Ok(refreshed)
    }

    fn delete_todo(&self, owner: OwnerId, id: TodoId) -> StoreResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !todo_exists(&tx, owner, id)? {
            return Err(StoreError::NotFound {
                entity: "todo",
                id,
            });
        }
        delete_todo_cascade(&tx, owner, id)?;
        tx.commit()?;
        Ok(())
    }

    fn toggle_complete(&self, owner: OwnerId, id: TodoId, completed: bool) -> StoreResult<Todo> {
        let sql = if completed {
            "UPDATE todos
             SET
                is_completed = 1,
                completed_at = (strftime('%s', 'now') * 1000),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND owner_uuid = ?2;"
        } else {
            "UPDATE todos
             SET
                is_completed = 0,
                completed_at = NULL,
                last_notified_at = NULL,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND owner_uuid = ?2;"
        };
        let changed = self
            .conn
            .execute(sql, params![id.to_string(), owner.to_string()])?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "todo",
                id,
            });
        }
        load_todo(self.conn, owner, id)?.ok_or_else(|| {
            StoreError::InvalidData("toggled todo missing on read-back".to_string())
        })
    }

    fn advance_recurrence(&self, owner: OwnerId, id: TodoId) -> StoreResult<Todo> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let todo = load_todo(&tx, owner, id)?.ok_or(StoreError::NotFound {
            entity: "todo",
            id,
        })?;

        if !todo.is_recurring {
            return Err(TodoValidationError::NotRecurring.into());
        }
        let pattern = todo
            .recurrence_pattern
            .ok_or(TodoValidationError::RecurringWithoutPattern)?;
        let due = todo.due_at.ok_or(TodoValidationError::RecurringWithoutDue)?;
        let next = next_occurrence(due, pattern).ok_or_else(|| {
            StoreError::InvalidData("due instant outside supported calendar range".to_string())
        })?;

        tx.execute(
            "UPDATE todos
             SET
                due_at = ?1,
                is_completed = 0,
                completed_at = NULL,
                last_notified_at = NULL,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2
               AND owner_uuid = ?3;",
            params![to_epoch_ms(next), id.to_string(), owner.to_string()],
        )?;

        let refreshed = load_todo(&tx, owner, id)?.ok_or_else(|| {
            StoreError::InvalidData("advanced todo missing on read-back".to_string())
        })?;
        tx.commit()?;
        Ok(refreshed)
    }

    fn mark_notified(
        &self,
        owner: OwnerId,
        id: TodoId,
        instant: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE todos
             SET
                last_notified_at = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2
               AND owner_uuid = ?3;",
            params![to_epoch_ms(instant), id.to_string(), owner.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "todo",
                id,
            });
        }
        Ok(())
    }
}

/// Inserts one todo row. Shared with the template engine and reconciler,
/// which call it inside their own transactions.
pub(crate) fn insert_todo(conn: &Connection, todo: &Todo) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO todos (
            uuid,
            owner_uuid,
            title,
            description,
            priority,
            due_at,
            is_completed,
            completed_at,
            is_recurring,
            recurrence_pattern,
            reminder_minutes,
            last_notified_at,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
        params![
            todo.uuid.to_string(),
            todo.owner_uuid.to_string(),
            todo.title,
            todo.description,
            todo.priority.as_db_str(),
            todo.due_at.map(to_epoch_ms),
            flag_to_int(todo.is_completed),
            todo.completed_at.map(to_epoch_ms),
            flag_to_int(todo.is_recurring),
            todo.recurrence_pattern.map(RecurrencePattern::as_db_str),
            todo.reminder_minutes,
            todo.last_notified_at.map(to_epoch_ms),
            to_epoch_ms(todo.created_at),
            to_epoch_ms(todo.updated_at),
        ],
    )?;
    Ok(())
}

/// Loads one owner-scoped todo.
pub(crate) fn load_todo(
    conn: &Connection,
    owner: OwnerId,
    id: TodoId,
) -> StoreResult<Option<Todo>> {
    let sql = format!("{TODO_SELECT_SQL} WHERE uuid = ?1 AND owner_uuid = ?2;");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![id.to_string(), owner.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_todo_row(row)?));
    }
    Ok(None)
}

pub(crate) fn todo_exists(conn: &Connection, owner: OwnerId, id: TodoId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM todos
            WHERE uuid = ?1
              AND owner_uuid = ?2
        );",
        params![id.to_string(), owner.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Removes one todo and everything hanging off it. Runs inside the
/// caller's transaction; the engine-level cascade FKs are a second line of
/// defense only.
pub(crate) fn delete_todo_cascade(conn: &Connection, owner: OwnerId, id: TodoId) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM subtasks WHERE todo_uuid = ?1;",
        [id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM todo_tags WHERE todo_uuid = ?1;",
        [id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM todos WHERE uuid = ?1 AND owner_uuid = ?2;",
        params![id.to_string(), owner.to_string()],
    )?;
    Ok(())
}

fn parse_todo_row(row: &Row<'_>) -> StoreResult<Todo> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "todos.uuid")?;
    let owner_text: String = row.get("owner_uuid")?;
    let owner_uuid = parse_uuid(&owner_text, "todos.owner_uuid")?;

    let priority_text: String = row.get("priority")?;
    let priority = Priority::parse(&priority_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid priority `{priority_text}` in todos.priority"))
    })?;

    let recurrence_pattern = match row.get::<_, Option<String>>("recurrence_pattern")? {
        Some(value) => Some(RecurrencePattern::parse(&value).ok_or_else(|| {
            StoreError::InvalidData(format!(
                "invalid recurrence pattern `{value}` in todos.recurrence_pattern"
            ))
        })?),
        None => None,
    };

    let todo = Todo {
        uuid,
        owner_uuid,
        title: row.get("title")?,
        description: row.get("description")?,
        priority,
        due_at: parse_opt_instant_ms(row.get("due_at")?, "todos.due_at")?,
        is_completed: parse_flag(row.get("is_completed")?, "todos.is_completed")?,
        completed_at: parse_opt_instant_ms(row.get("completed_at")?, "todos.completed_at")?,
        is_recurring: parse_flag(row.get("is_recurring")?, "todos.is_recurring")?,
        recurrence_pattern,
        reminder_minutes: row.get("reminder_minutes")?,
        last_notified_at: parse_opt_instant_ms(
            row.get("last_notified_at")?,
            "todos.last_notified_at",
        )?,
        created_at: parse_instant_ms(row.get("created_at")?, "todos.created_at")?,
        updated_at: parse_instant_ms(row.get("updated_at")?, "todos.updated_at")?,
    };
    Ok(todo)
}
