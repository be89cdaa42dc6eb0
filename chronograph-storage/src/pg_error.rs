//! Maps diesel/driver errors onto the crate's error taxonomy (§7), the way
//! `storage_error_from_diesel`/`PostgresError` do in the teacher's
//! `tycho-storage::postgres` module.

use chronograph_core::ChronographError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Local wrapper enabling a `From<diesel::result::Error>` impl, since neither
/// `ChronographError` nor `diesel::result::Error` is defined in this crate
/// (orphan rule). Mirrors the teacher's `PostgresError` newtype.
pub struct PgError(pub ChronographError);

impl From<PgError> for ChronographError {
    fn from(value: PgError) -> Self {
        value.0
    }
}

impl From<DieselError> for PgError {
    fn from(value: DieselError) -> Self {
        PgError(from_diesel(value, "entity", ""))
    }
}

pub fn from_diesel(err: DieselError, entity: &'static str, id: &str) -> ChronographError {
    match err {
        DieselError::NotFound => ChronographError::not_found(entity, id),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, details) => {
            ChronographError::conflict(format!(
                "{entity} {id}: unique constraint violated: {}",
                details.message()
            ))
        }
        other => ChronographError::database(anyhow::anyhow!(other.to_string())),
    }
}

pub fn from_pool(err: impl std::fmt::Display) -> ChronographError {
    ChronographError::database(anyhow::anyhow!("connection pool error: {err}"))
}
