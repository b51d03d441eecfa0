//! Storage error type and SQL column conversion helpers.

use chrono::NaiveDate;
use gradebook_api::{EntityRef, KeyParseError, SyncState};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use thiserror::Error;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("row not found in {table}: {key}")]
    NotFound { table: &'static str, key: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt mirror row: {0}")]
    Corrupt(#[from] KeyParseError),
}

/// The local mutation verbs a caller can record against the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn state_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<SyncState> {
    let raw: String = row.get(idx)?;
    SyncState::parse(&raw).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn ref_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<EntityRef> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: KeyParseError| conversion_err(idx, e))
}

pub(crate) fn opt_ref_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<EntityRef>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: KeyParseError| conversion_err(idx, e)),
        None => Ok(None),
    }
}

pub(crate) fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse::<NaiveDate>()
            .map(Some)
            .map_err(|e| conversion_err(idx, e)),
        None => Ok(None),
    }
}

pub(crate) fn bind_ref(reference: &EntityRef) -> Value {
    Value::Text(reference.encode())
}

pub(crate) fn bind_opt_ref(reference: &Option<EntityRef>) -> Value {
    match reference {
        Some(r) => bind_ref(r),
        None => Value::Null,
    }
}

pub(crate) fn bind_opt_text(text: &Option<String>) -> Value {
    match text {
        Some(t) => Value::Text(t.clone()),
        None => Value::Null,
    }
}

pub(crate) fn bind_date(date: &Option<NaiveDate>) -> Value {
    match date {
        Some(d) => Value::Text(d.to_string()),
        None => Value::Null,
    }
}
