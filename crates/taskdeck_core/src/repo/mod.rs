//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for todos, tags,
//!   subtasks and templates.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes enforce model `validate()` before persistence.
//! - Every repository holds an injected `&Connection`; there is no shared
//!   module-level handle.
//! - Repository APIs return semantic errors (`NotFound`,
//!   `Constraint`) in addition to DB transport errors.

use crate::civil::from_epoch_ms;
use crate::db::DbError;
use crate::db::migrations::latest_version;
use crate::model::ValidationError;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod subtask_repo;
pub mod tag_repo;
pub mod template_repo;
pub mod todo_repo;

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared error taxonomy for every store and service operation.
#[derive(Debug)]
pub enum StoreError {
    /// Malformed or out-of-range input, with user-presentable context.
    Validation(ValidationError),
    /// Id/owner mismatch or missing reference.
    NotFound { entity: &'static str, id: Uuid },
    /// Uniqueness or enum violation surfaced by the engine. Duplicate-name
    /// races surface here and are left for the caller to resolve.
    Constraint(String),
    /// Snapshot format version mismatch; no cross-version migration.
    UnsupportedVersion {
        found: String,
        supported: &'static str,
    },
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Persisted state cannot be converted to a valid read model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
            Self::UnsupportedVersion { found, supported } => write!(
                f,
                "snapshot version `{found}` is not supported (expected `{supported}`)"
            ),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "store requires table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "store requires column `{column}` in table `{table}`")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        // Engine-level uniqueness/CHECK failures become their own taxonomy
        // entry instead of a generic transport error.
        if let rusqlite::Error::SqliteFailure(err, ref message) = value {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                let detail = message
                    .clone()
                    .unwrap_or_else(|| "constraint violated".to_string());
                return Self::Constraint(detail);
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<crate::model::todo::TodoValidationError> for StoreError {
    fn from(value: crate::model::todo::TodoValidationError) -> Self {
        Self::Validation(ValidationError::Todo(value))
    }
}

impl From<crate::model::tag::TagValidationError> for StoreError {
    fn from(value: crate::model::tag::TagValidationError) -> Self {
        Self::Validation(ValidationError::Tag(value))
    }
}

impl From<crate::model::subtask::SubtaskValidationError> for StoreError {
    fn from(value: crate::model::subtask::SubtaskValidationError) -> Self {
        Self::Validation(ValidationError::Subtask(value))
    }
}

impl From<crate::model::template::TemplateValidationError> for StoreError {
    fn from(value: crate::model::template::TemplateValidationError) -> Self {
        Self::Validation(ValidationError::Template(value))
    }
}

/// Verifies the connection carries the migrated schema this build expects,
/// including every table/column the caller names.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    requirements: &[(&'static str, &[&'static str])],
) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in requirements.iter().copied() {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
        for column in columns.iter().copied() {
            if !table_has_column(conn, table, column)? {
                return Err(StoreError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn parse_instant_ms(value: i64, column: &'static str) -> StoreResult<DateTime<Utc>> {
    from_epoch_ms(value).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid epoch milliseconds `{value}` in {column}"))
    })
}

pub(crate) fn parse_opt_instant_ms(
    value: Option<i64>,
    column: &'static str,
) -> StoreResult<Option<DateTime<Utc>>> {
    value.map(|ms| parse_instant_ms(ms, column)).transpose()
}

pub(crate) fn flag_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
