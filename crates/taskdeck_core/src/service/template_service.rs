//! Template engine: blueprint CRUD and materialization.
//!
//! # Responsibility
//! - Validate and normalize every blueprint sub-field independently.
//! - Materialize a template into a concrete todo with attached tags and
//!   subtasks, atomically.
//!
//! # Invariants
//! - An explicit due instant wins over offset days and must be at least one
//!   minute in the future.
//! - A declared recurrence pattern or reminder offset makes a resolved due
//!   instant mandatory.
//! - Dangling tag references are reported via `missing_tag_ids`, never
//!   fatal; every other failure aborts the whole materialization.

use crate::civil::{add_civil_days, Clock};
use crate::model::subtask::Subtask;
use crate::model::tag::TagId;
use crate::model::template::{
    normalize_blueprint_subtasks, Template, TemplateId, TemplateSubtask, TemplateValidationError,
};
use crate::model::todo::{OwnerId, Priority, RecurrencePattern, Todo};
use crate::repo::subtask_repo::insert_subtask;
use crate::repo::tag_repo::{attach_link, tag_exists};
use crate::repo::template_repo::{SqliteTemplateRepository, TemplateRepository};
use crate::repo::todo_repo::insert_todo;
use crate::repo::{StoreError, StoreResult};
use chrono::{DateTime, Duration, Utc};
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Caller-supplied blueprint fields for create/update.
#[derive(Debug, Clone, Default)]
pub struct TemplateDraft {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub todo_title: String,
    pub todo_description: String,
    pub priority: Priority,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub reminder_minutes: Option<i64>,
    pub due_offset_days: Option<i64>,
    pub estimated_minutes: Option<i64>,
    pub tag_uuids: Vec<TagId>,
    pub subtasks: Vec<TemplateSubtask>,
}

/// Due-instant inputs for one materialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseTemplateOptions {
    /// Wins over any offset; must be ≥1 minute in the future.
    pub explicit_due_at: Option<DateTime<Utc>>,
    /// Overrides the blueprint's own offset when set.
    pub due_offset_days: Option<i64>,
}

/// Result of one materialization.
#[derive(Debug, Clone)]
pub struct MaterializedTemplate {
    pub todo: Todo,
    pub subtasks: Vec<Subtask>,
    pub attached_tag_ids: Vec<TagId>,
    /// Referenced tags that no longer exist; reported, not fatal.
    pub missing_tag_ids: Vec<TagId>,
}

/// Template engine facade composing the todo, tag and subtask stores over
/// one injected connection.
pub struct TemplateService<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
}

impl<'a> TemplateService<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock) -> Self {
        Self { conn, clock }
    }

    /// Validates, normalizes and persists a new blueprint.
    pub fn create_template(&self, owner: OwnerId, draft: TemplateDraft) -> StoreResult<Template> {
        let repo = SqliteTemplateRepository::try_new(self.conn)?;
        let mut template = Template::new(owner, draft.name.clone(), self.clock.now_utc());
        apply_draft(&mut template, draft);
        template.validate()?;
        self.ensure_tags_owned(owner, &template.tag_uuids)?;
        repo.create_template(&template)?;
        repo.get_template(owner, template.uuid)?.ok_or_else(|| {
            StoreError::InvalidData("created template missing on read-back".to_string())
        })
    }

    /// Validates, normalizes and replaces an existing blueprint.
    pub fn update_template(
        &self,
        owner: OwnerId,
        id: TemplateId,
        draft: TemplateDraft,
    ) -> StoreResult<Template> {
        let repo = SqliteTemplateRepository::try_new(self.conn)?;
        let mut template = repo
            .get_template(owner, id)?
            .ok_or(StoreError::NotFound {
                entity: "template",
                id,
            })?;
        apply_draft(&mut template, draft);
        template.validate()?;
        self.ensure_tags_owned(owner, &template.tag_uuids)?;
        repo.update_template(&template)?;
        repo.get_template(owner, id)?.ok_or_else(|| {
            StoreError::InvalidData("updated template missing on read-back".to_string())
        })
    }

    pub fn get_template(&self, owner: OwnerId, id: TemplateId) -> StoreResult<Option<Template>> {
        SqliteTemplateRepository::try_new(self.conn)?.get_template(owner, id)
    }

    pub fn list_templates(&self, owner: OwnerId) -> StoreResult<Vec<Template>> {
        SqliteTemplateRepository::try_new(self.conn)?.list_for_owner(owner)
    }

    pub fn delete_template(&self, owner: OwnerId, id: TemplateId) -> StoreResult<()> {
        SqliteTemplateRepository::try_new(self.conn)?.delete_template(owner, id)
    }

    /// Materializes a blueprint into a concrete todo.
    ///
    /// Todo creation, tag attachment and subtask insertion happen in one
    /// immediate transaction.
    pub fn use_template(
        &self,
        owner: OwnerId,
        id: TemplateId,
        options: UseTemplateOptions,
    ) -> StoreResult<MaterializedTemplate> {
        let repo = SqliteTemplateRepository::try_new(self.conn)?;
        let template = repo.get_template(owner, id)?.ok_or(StoreError::NotFound {
            entity: "template",
            id,
        })?;

        let now = self.clock.now_utc();
        let due_at = resolve_due_instant(&template, &options, now)?;

        if template.recurrence_pattern.is_some() && due_at.is_none() {
            return Err(TemplateValidationError::RecurrenceRequiresDue.into());
        }
        if template.reminder_minutes.is_some() && due_at.is_none() {
            return Err(TemplateValidationError::ReminderRequiresDue.into());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let mut attached_tag_ids = Vec::new();
        let mut missing_tag_ids = Vec::new();
        for tag_id in &template.tag_uuids {
            if tag_exists(&tx, owner, *tag_id)? {
                attached_tag_ids.push(*tag_id);
            } else {
                missing_tag_ids.push(*tag_id);
            }
        }

        let mut todo = Todo::new(owner, template.todo_title.clone(), now);
        todo.description = template.todo_description.clone();
        todo.priority = template.priority;
        todo.due_at = due_at;
        todo.recurrence_pattern = template.recurrence_pattern;
        todo.is_recurring = template.recurrence_pattern.is_some();
        todo.reminder_minutes = template.reminder_minutes;
        todo.validate()?;
        insert_todo(&tx, &todo)?;

        for tag_id in &attached_tag_ids {
            attach_link(&tx, todo.uuid, *tag_id)?;
        }

        let mut subtasks = Vec::new();
        for (index, blueprint) in template.subtasks.iter().enumerate() {
            let subtask = Subtask::new(todo.uuid, blueprint.title.clone(), index as i64 + 1, now);
            subtask.validate()?;
            insert_subtask(&tx, &subtask)?;
            subtasks.push(subtask);
        }

        tx.commit()?;

        info!(
            "event=template_use module=service status=ok template={} todo={} subtasks={} tags_attached={} tags_missing={}",
            template.uuid,
            todo.uuid,
            subtasks.len(),
            attached_tag_ids.len(),
            missing_tag_ids.len()
        );

        Ok(MaterializedTemplate {
            todo,
            subtasks,
            attached_tag_ids,
            missing_tag_ids,
        })
    }

    fn ensure_tags_owned(&self, owner: OwnerId, tag_uuids: &[Uuid]) -> StoreResult<()> {
        for tag_id in tag_uuids {
            if !tag_exists(self.conn, owner, *tag_id)? {
                return Err(StoreError::NotFound {
                    entity: "tag",
                    id: *tag_id,
                });
            }
        }
        Ok(())
    }
}

fn apply_draft(template: &mut Template, draft: TemplateDraft) {
    template.name = draft.name;
    template.category = draft.category;
    template.description = draft.description;
    template.todo_title = draft.todo_title;
    template.todo_description = draft.todo_description;
    template.priority = draft.priority;
    template.recurrence_pattern = draft.recurrence_pattern;
    template.reminder_minutes = draft.reminder_minutes;
    template.due_offset_days = draft.due_offset_days;
    template.estimated_minutes = draft.estimated_minutes;
    template.tag_uuids = draft.tag_uuids;
    template.subtasks = normalize_blueprint_subtasks(draft.subtasks);
}

/// Resolves the due instant for one materialization.
///
/// Explicit instant wins and must be ≥1 minute ahead of `now`; otherwise
/// "now + offset days" computed in civil time, nudged forward 5 minutes
/// when it would land in the past.
fn resolve_due_instant(
    template: &Template,
    options: &UseTemplateOptions,
    now: DateTime<Utc>,
) -> StoreResult<Option<DateTime<Utc>>> {
    if let Some(explicit) = options.explicit_due_at {
        if explicit < now + Duration::minutes(1) {
            return Err(TemplateValidationError::DueInstantNotInFuture.into());
        }
        return Ok(Some(explicit));
    }

    let offset_days = match options.due_offset_days.or(template.due_offset_days) {
        Some(days) if days < 0 => {
            return Err(TemplateValidationError::NegativeDueOffset { days }.into());
        }
        Some(days) => days,
        None => return Ok(None),
    };

    let candidate = add_civil_days(now, offset_days as u64).ok_or_else(|| {
        StoreError::InvalidData("due offset outside supported calendar range".to_string())
    })?;
    if candidate <= now {
        return Ok(Some(now + Duration::minutes(5)));
    }
    Ok(Some(candidate))
}
