//! The error taxonomy (§7).
//!
//! Mirrors the shape of `tycho_core::storage::StorageError`: one
//! `thiserror` enum, one variant per external-facing category, an opaque
//! `Database` variant for wrapped driver failures. Every core component
//! returns `Result<_, ChronographError>`; the api crate is the only place
//! that turns this into a JSON `{error: {code, message}}` body.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChronographError {
    /// Identity resolves to no row.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input: invalid id, cursor, vector length, self-loop,
    /// cross-branch endpoints, patch of tombstone, restore of live object,
    /// no-op explicit patch.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Violated HEAD uniqueness. Should not happen under advisory locks;
    /// indicates a bug or a lock bypass.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is missing the scope required for a privileged mode (e.g.
    /// hybrid-search debug telemetry).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Infrastructure failure. The driver error is wrapped as internal
    /// cause and logged, never exposed verbatim to a client.
    #[error("database error")]
    Database(#[source] anyhow::Error),

    /// The schema provider reported a property mismatch.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ChronographError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ChronographError::NotFound { entity, id: id.into() }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ChronographError::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ChronographError::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ChronographError::Forbidden(msg.into())
    }

    pub fn database(err: impl Into<anyhow::Error>) -> Self {
        ChronographError::Database(err.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ChronographError::Validation(msg.into())
    }

    /// Stable machine-readable code, used by the api crate to build the
    /// `error.code` field of §7's JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            ChronographError::NotFound { .. } => "not_found",
            ChronographError::BadRequest(_) => "bad_request",
            ChronographError::Conflict(_) => "conflict",
            ChronographError::Forbidden(_) => "forbidden",
            ChronographError::Database(_) => "database",
            ChronographError::Validation(_) => "validation",
        }
    }
}
