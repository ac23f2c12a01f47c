//! Template repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist todo blueprints, with tag references and subtask blueprints
//!   serialized as JSON columns.
//!
//! # Invariants
//! - Write paths call `Template::validate()` before SQL mutations.
//! - Stored subtask blueprints are already normalized to dense 1..N order.
//! - Name uniqueness per owner is enforced by the engine (case-insensitive
//!   UNIQUE index) and surfaces as a constraint violation.

use crate::civil::to_epoch_ms;
use crate::model::template::{Template, TemplateId, TemplateSubtask};
use crate::model::todo::{OwnerId, Priority, RecurrencePattern};
use crate::repo::{ensure_connection_ready, parse_instant_ms, parse_uuid, StoreError, StoreResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const TEMPLATE_SELECT_SQL: &str = "SELECT
    uuid,
    owner_uuid,
    name,
    category,
    description,
    todo_title,
    todo_description,
    priority,
    recurrence_pattern,
    reminder_minutes,
    due_offset_days,
    estimated_minutes,
    tag_uuids,
    subtasks,
    created_at,
    updated_at
FROM templates";

/// Repository interface for template blueprints.
pub trait TemplateRepository {
    /// Persists one validated template and returns its stable id.
    fn create_template(&self, template: &Template) -> StoreResult<TemplateId>;
    /// Replaces every blueprint field of one owned template.
    fn update_template(&self, template: &Template) -> StoreResult<()>;
    /// Loads one owner-scoped template.
    fn get_template(&self, owner: OwnerId, id: TemplateId) -> StoreResult<Option<Template>>;
    /// Lists one owner's templates in case-insensitive name order.
    fn list_for_owner(&self, owner: OwnerId) -> StoreResult<Vec<Template>>;
    /// Deletes one owned template.
    fn delete_template(&self, owner: OwnerId, id: TemplateId) -> StoreResult<()>;
}

/// SQLite-backed template repository over an injected connection.
pub struct SqliteTemplateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTemplateRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(
            conn,
            &[(
                "templates",
                &[
                    "uuid",
                    "owner_uuid",
                    "name",
                    "category",
                    "description",
                    "todo_title",
                    "todo_description",
                    "priority",
                    "recurrence_pattern",
                    "reminder_minutes",
                    "due_offset_days",
                    "estimated_minutes",
                    "tag_uuids",
                    "subtasks",
                    "created_at",
                    "updated_at",
                ],
            )],
        )?;
        Ok(Self { conn })
    }
}

impl TemplateRepository for SqliteTemplateRepository<'_> {
    fn create_template(&self, template: &Template) -> StoreResult<TemplateId> {
        template.validate()?;
        self.conn.execute(
            "INSERT INTO templates (
                uuid,
                owner_uuid,
                name,
                category,
                description,
                todo_title,
                todo_description,
                priority,
                recurrence_pattern,
                reminder_minutes,
                due_offset_days,
                estimated_minutes,
                tag_uuids,
                subtasks,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16);",
            params![
                template.uuid.to_string(),
                template.owner_uuid.to_string(),
                template.name,
                template.category,
                template.description,
                template.todo_title,
                template.todo_description,
                template.priority.as_db_str(),
                template
                    .recurrence_pattern
                    .map(RecurrencePattern::as_db_str),
                template.reminder_minutes,
                template.due_offset_days,
                template.estimated_minutes,
                encode_tag_uuids(&template.tag_uuids)?,
                encode_subtasks(&template.subtasks)?,
                to_epoch_ms(template.created_at),
                to_epoch_ms(template.updated_at),
            ],
        )?;
        Ok(template.uuid)
    }

    fn update_template(&self, template: &Template) -> StoreResult<()> {
        template.validate()?;
        let changed = self.conn.execute(
            "UPDATE templates
             SET
                name = ?1,
                category = ?2,
                description = ?3,
                todo_title = ?4,
                todo_description = ?5,
                priority = ?6,
                recurrence_pattern = ?7,
                reminder_minutes = ?8,
                due_offset_days = ?9,
                estimated_minutes = ?10,
                tag_uuids = ?11,
                subtasks = ?12,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?13
               AND owner_uuid = ?14;",
            params![
                template.name,
                template.category,
                template.description,
                template.todo_title,
                template.todo_description,
                template.priority.as_db_str(),
                template
                    .recurrence_pattern
                    .map(RecurrencePattern::as_db_str),
                template.reminder_minutes,
                template.due_offset_days,
                template.estimated_minutes,
                encode_tag_uuids(&template.tag_uuids)?,
                encode_subtasks(&template.subtasks)?,
                template.uuid.to_string(),
                template.owner_uuid.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "template",
                id: template.uuid,
            });
        }
        Ok(())
    }

    fn get_template(&self, owner: OwnerId, id: TemplateId) -> StoreResult<Option<Template>> {
        let sql = format!("{TEMPLATE_SELECT_SQL} WHERE uuid = ?1 AND owner_uuid = ?2;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string(), owner.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_template_row(row)?));
        }
        Ok(None)
    }

    fn list_for_owner(&self, owner: OwnerId) -> StoreResult<Vec<Template>> {
        let sql = format!(
            "{TEMPLATE_SELECT_SQL}
             WHERE owner_uuid = ?1
             ORDER BY name COLLATE NOCASE ASC, uuid ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([owner.to_string()])?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next()? {
            templates.push(parse_template_row(row)?);
        }
        Ok(templates)
    }

    fn delete_template(&self, owner: OwnerId, id: TemplateId) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM templates WHERE uuid = ?1 AND owner_uuid = ?2;",
            params![id.to_string(), owner.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "template",
                id,
            });
        }
        Ok(())
    }
}

fn encode_tag_uuids(tag_uuids: &[Uuid]) -> StoreResult<String> {
    let texts: Vec<String> = tag_uuids.iter().map(Uuid::to_string).collect();
    serde_json::to_string(&texts)
        .map_err(|err| StoreError::InvalidData(format!("cannot encode tag id list: {err}")))
}

fn encode_subtasks(subtasks: &[TemplateSubtask]) -> StoreResult<String> {
    serde_json::to_string(subtasks)
        .map_err(|err| StoreError::InvalidData(format!("cannot encode subtask blueprints: {err}")))
}

fn decode_tag_uuids(value: &str) -> StoreResult<Vec<Uuid>> {
    let texts: Vec<String> = serde_json::from_str(value).map_err(|err| {
        StoreError::InvalidData(format!("invalid tag id list in templates.tag_uuids: {err}"))
    })?;
    texts
        .iter()
        .map(|text| parse_uuid(text, "templates.tag_uuids"))
        .collect()
}

fn decode_subtasks(value: &str) -> StoreResult<Vec<TemplateSubtask>> {
    serde_json::from_str(value).map_err(|err| {
        StoreError::InvalidData(format!(
            "invalid subtask blueprints in templates.subtasks: {err}"
        ))
    })
}

fn parse_template_row(row: &Row<'_>) -> StoreResult<Template> {
    let uuid_text: String = row.get("uuid")?;
    let owner_text: String = row.get("owner_uuid")?;

    let priority_text: String = row.get("priority")?;
    let priority = Priority::parse(&priority_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid priority `{priority_text}` in templates.priority"
        ))
    })?;

    let recurrence_pattern = match row.get::<_, Option<String>>("recurrence_pattern")? {
        Some(value) => Some(RecurrencePattern::parse(&value).ok_or_else(|| {
            StoreError::InvalidData(format!(
                "invalid recurrence pattern `{value}` in templates.recurrence_pattern"
            ))
        })?),
        None => None,
    };

    let tag_uuids_text: String = row.get("tag_uuids")?;
    let subtasks_text: String = row.get("subtasks")?;

    Ok(Template {
        uuid: parse_uuid(&uuid_text, "templates.uuid")?,
        owner_uuid: parse_uuid(&owner_text, "templates.owner_uuid")?,
        name: row.get("name")?,
        category: row.get("category")?,
        description: row.get("description")?,
        todo_title: row.get("todo_title")?,
        todo_description: row.get("todo_description")?,
        priority,
        recurrence_pattern,
        reminder_minutes: row.get("reminder_minutes")?,
        due_offset_days: row.get("due_offset_days")?,
        estimated_minutes: row.get("estimated_minutes")?,
        tag_uuids: decode_tag_uuids(&tag_uuids_text)?,
        subtasks: decode_subtasks(&subtasks_text)?,
        created_at: parse_instant_ms(row.get("created_at")?, "templates.created_at")?,
        updated_at: parse_instant_ms(row.get("updated_at")?, "templates.updated_at")?,
    })
}
