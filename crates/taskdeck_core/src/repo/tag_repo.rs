//! Tag repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Own tag CRUD and the todo<->tag association.
//! - Keep name uniqueness and sort order case-insensitive; persist colors
//!   in canonical uppercase form.
//!
//! # Invariants
//! - `attach` is idempotent; attaching an already-attached pair is not an
//!   error.
//! - Attach/detach verify both sides exist for the owner before touching
//!   the association.
//! - Deleting a tag removes its associations only, never the todos.

use crate::civil::to_epoch_ms;
use crate::model::tag::{normalize_color, Tag, TagId, TagValidationError};
use crate::model::todo::{OwnerId, TodoId};
use crate::repo::todo_repo::todo_exists;
use crate::repo::{
    ensure_connection_ready, parse_instant_ms, parse_uuid, StoreError, StoreResult,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const TAG_SELECT_SQL: &str = "SELECT
    uuid,
    owner_uuid,
    name,
    color,
    description,
    created_at,
    updated_at
FROM tags";

/// Tag plus attached-todo count for UI badges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWithCount {
    pub tag: Tag,
    pub todo_count: i64,
}

/// Repository interface for tag operations.
pub trait TagRepository {
    /// Persists one validated tag; duplicate names surface as a constraint
    /// violation from the engine.
    fn create_tag(&self, tag: &Tag) -> StoreResult<TagId>;
    /// Replaces name/color/description of one owned tag.
    fn update_tag(&self, tag: &Tag) -> StoreResult<()>;
    /// Deletes one owned tag and its associations.
    fn delete_tag(&self, owner: OwnerId, id: TagId) -> StoreResult<()>;
    /// Loads one owner-scoped tag.
    fn get_tag(&self, owner: OwnerId, id: TagId) -> StoreResult<Option<Tag>>;
    /// Lists tags with attached-todo counts, case-insensitive name order.
    fn list_with_counts(&self, owner: OwnerId) -> StoreResult<Vec<TagWithCount>>;
    /// Lists tags attached to one owned todo.
    fn tags_for_todo(&self, owner: OwnerId, todo_id: TodoId) -> StoreResult<Vec<Tag>>;
    /// Associates a tag with a todo; idempotent.
    fn attach(&self, owner: OwnerId, todo_id: TodoId, tag_id: TagId) -> StoreResult<()>;
    /// Removes the association; missing association rows are a no-op.
    fn detach(&self, owner: OwnerId, todo_id: TodoId, tag_id: TagId) -> StoreResult<()>;
}

/// SQLite-backed tag repository over an injected connection.
pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                (
                    "tags",
                    &[
                        "uuid",
                        "owner_uuid",
                        "name",
                        "color",
                        "description",
                        "created_at",
                        "updated_at",
                    ],
                ),
                ("todo_tags", &["todo_uuid", "tag_uuid"]),
                ("todos", &["uuid", "owner_uuid"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl TagRepository for SqliteTagRepository<'_> {
    fn create_tag(&self, tag: &Tag) -> StoreResult<TagId> {
        tag.validate()?;
        insert_tag(self.conn, tag)?;
        Ok(tag.uuid)
    }

    fn update_tag(&self, tag: &Tag) -> StoreResult<()> {
        tag.validate()?;
        let color = canonical_color(&tag.color)?;
        let changed = self.conn.execute(
            "UPDATE tags
             SET
                name = ?1,
                color = ?2,
                description = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?4
               AND owner_uuid = ?5;",
            params![
                tag.name,
                color,
                tag.description,
                tag.uuid.to_string(),
                tag.owner_uuid.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "tag",
                id: tag.uuid,
            });
        }
        Ok(())
    }

    fn delete_tag(&self, owner: OwnerId, id: TagId) -> StoreResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !tag_exists(&tx, owner, id)? {
            return Err(StoreError::NotFound {
                entity: "tag",
                id,
            });
        }
        tx.execute(
            "DELETE FROM todo_tags WHERE tag_uuid = ?1;",
            [id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM tags WHERE uuid = ?1 AND owner_uuid = ?2;",
            params![id.to_string(), owner.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_tag(&self, owner: OwnerId, id: TagId) -> StoreResult<Option<Tag>> {
        let sql = format!("{TAG_SELECT_SQL} WHERE uuid = ?1 AND owner_uuid = ?2;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string(), owner.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_tag_row(row)?));
        }
        Ok(None)
    }

    fn list_with_counts(&self, owner: OwnerId) -> StoreResult<Vec<TagWithCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                t.uuid AS uuid,
                t.owner_uuid AS owner_uuid,
                t.name AS name,
                t.color AS color,
                t.description AS description,
                t.created_at AS created_at,
                t.updated_at AS updated_at,
                COUNT(tt.todo_uuid) AS todo_count
             FROM tags t
             LEFT JOIN todo_tags tt ON tt.tag_uuid = t.uuid
             WHERE t.owner_uuid = ?1
             GROUP BY t.uuid
             ORDER BY t.name COLLATE NOCASE ASC, t.uuid ASC;",
        )?;
        let mut rows = stmt.query([owner.to_string()])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let todo_count: i64 = row.get("todo_count")?;
            result.push(TagWithCount {
                tag: parse_tag_row(row)?,
                todo_count,
            });
        }
        Ok(result)
    }

    fn tags_for_todo(&self, owner: OwnerId, todo_id: TodoId) -> StoreResult<Vec<Tag>> {
        if !todo_exists(self.conn, owner, todo_id)? {
            return Err(StoreError::NotFound {
                entity: "todo",
                id: todo_id,
            });
        }
        let mut stmt = self.conn.prepare(
            "SELECT
                t.uuid AS uuid,
                t.owner_uuid AS owner_uuid,
                t.name AS name,
                t.color AS color,
                t.description AS description,
                t.created_at AS created_at,
                t.updated_at AS updated_at
             FROM todo_tags tt
             INNER JOIN tags t ON t.uuid = tt.tag_uuid
             WHERE tt.todo_uuid = ?1
             ORDER BY t.name COLLATE NOCASE ASC, t.uuid ASC;",
        )?;
        let mut rows = stmt.query([todo_id.to_string()])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }

    fn attach(&self, owner: OwnerId, todo_id: TodoId, tag_id: TagId) -> StoreResult<()> {
        ensure_pair_owned(self.conn, owner, todo_id, tag_id)?;
        attach_link(self.conn, todo_id, tag_id)?;
        Ok(())
    }

    fn detach(&self, owner: OwnerId, todo_id: TodoId, tag_id: TagId) -> StoreResult<()> {
        ensure_pair_owned(self.conn, owner, todo_id, tag_id)?;
        self.conn.execute(
            "DELETE FROM todo_tags WHERE todo_uuid = ?1 AND tag_uuid = ?2;",
            params![todo_id.to_string(), tag_id.to_string()],
        )?;
        Ok(())
    }
}

/// Inserts one tag row with the canonical color form. Shared with the
/// reconciler, which calls it inside its import transaction.
pub(crate) fn insert_tag(conn: &Connection, tag: &Tag) -> StoreResult<()> {
    let color = canonical_color(&tag.color)?;
    conn.execute(
        "INSERT INTO tags (
            uuid,
            owner_uuid,
            name,
            color,
            description,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            tag.uuid.to_string(),
            tag.owner_uuid.to_string(),
            tag.name,
            color,
            tag.description,
            to_epoch_ms(tag.created_at),
            to_epoch_ms(tag.updated_at),
        ],
    )?;
    Ok(())
}

pub(crate) fn tag_exists(conn: &Connection, owner: OwnerId, id: TagId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM tags
            WHERE uuid = ?1
              AND owner_uuid = ?2
        );",
        params![id.to_string(), owner.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Idempotent association insert, shared with the template engine and
/// reconciler.
pub(crate) fn attach_link(conn: &Connection, todo_id: TodoId, tag_id: TagId) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO todo_tags (todo_uuid, tag_uuid) VALUES (?1, ?2);",
        params![todo_id.to_string(), tag_id.to_string()],
    )?;
    Ok(())
}

/// Lists `(name, uuid)` pairs for one owner, used by the reconciler's
/// reuse-or-create decision.
pub(crate) fn list_tag_names(conn: &Connection, owner: OwnerId) -> StoreResult<Vec<(String, TagId)>> {
    let mut stmt = conn.prepare("SELECT name, uuid FROM tags WHERE owner_uuid = ?1;")?;
    let mut rows = stmt.query([owner.to_string()])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let uuid_text: String = row.get(1)?;
        result.push((name, parse_uuid(&uuid_text, "tags.uuid")?));
    }
    Ok(result)
}

fn ensure_pair_owned(
    conn: &Connection,
    owner: OwnerId,
    todo_id: TodoId,
    tag_id: TagId,
) -> StoreResult<()> {
    if !todo_exists(conn, owner, todo_id)? {
        return Err(StoreError::NotFound {
            entity: "todo",
            id: todo_id,
        });
    }
    if !tag_exists(conn, owner, tag_id)? {
        return Err(StoreError::NotFound {
            entity: "tag",
            id: tag_id,
        });
    }
    Ok(())
}

fn canonical_color(value: &str) -> StoreResult<String> {
    normalize_color(value).ok_or_else(|| {
        StoreError::from(TagValidationError::InvalidColor {
            value: value.to_string(),
        })
    })
}

fn parse_tag_row(row: &Row<'_>) -> StoreResult<Tag> {
    let uuid_text: String = row.get("uuid")?;
    let owner_text: String = row.get("owner_uuid")?;
    Ok(Tag {
        uuid: parse_uuid(&uuid_text, "tags.uuid")?,
        owner_uuid: parse_uuid(&owner_text, "tags.owner_uuid")?,
        name: row.get("name")?,
        color: row.get("color")?,
        description: row.get("description")?,
        created_at: parse_instant_ms(row.get("created_at")?, "tags.created_at")?,
        updated_at: parse_instant_ms(row.get("updated_at")?, "tags.updated_at")?,
    })
}
