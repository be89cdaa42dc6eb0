//! Maps `ChronographError` onto actix-web's `ResponseError`, producing the
//! stable `{error: {code, message}}` JSON body of §7. A local wrapper is
//! needed because neither `actix_web::ResponseError` nor `ChronographError`
//! is defined in this crate (orphan rule) -- the same newtype-for-a-foreign-
//! trait shape as `chronograph_storage::pg_error::PgError`.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chronograph_core::ChronographError;
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError(pub ChronographError);

impl From<ChronographError> for ApiError {
    fn from(err: ChronographError) -> Self {
        ApiError(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            ChronographError::NotFound { .. } => StatusCode::NOT_FOUND,
            ChronographError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ChronographError::Conflict(_) => StatusCode::CONFLICT,
            ChronographError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChronographError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChronographError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Internal causes are logged but never exposed to the client (§7
    /// "Propagation"): a `Database` error's message is replaced with a fixed
    /// string in the response body.
    fn error_response(&self) -> HttpResponse {
        let message = match &self.0 {
            ChronographError::Database(err) => {
                tracing::error!(error = %err, "internal database error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: ErrorDetail { code: self.0.code(), message },
        })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
