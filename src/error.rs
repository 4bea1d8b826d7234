use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::validation::ValidationErrors;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Authentication credentials were not provided")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Could not allocate a unique short link after {0} attempts")]
    ShortLinkExhausted(usize),

    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn forbidden() -> Self {
        AppError::Forbidden("You do not have permission to perform this action.".to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::ShortLinkExhausted(_) => "short_link_exhausted",
            AppError::Database(_) | AppError::Serialization(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ShortLinkExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// redb reports each stage through its own error type; all of them fold into redb::Error.
macro_rules! from_redb_error {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for AppError {
                fn from(e: $source) -> Self {
                    AppError::Database(redb::Error::from(e))
                }
            }
        )*
    };
}

from_redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match &self {
            AppError::Validation(fields) => {
                warn!(%fields, "request rejected by validation");
                json!({
                    "error": "Validation failed",
                    "code": code,
                    "fields": fields,
                })
            }
            AppError::Database(_) | AppError::Serialization(_) => {
                error!(error = %self, "internal error while handling request");
                json!({
                    "error": "Internal server error",
                    "code": code,
                })
            }
            AppError::ShortLinkExhausted(_) => {
                error!(error = %self, "short link space exhausted");
                json!({ "error": self.to_string(), "code": code })
            }
            _ => {
                warn!(status = status.as_u16(), error = %self, "request rejected");
                json!({ "error": self.to_string(), "code": code })
            }
        };

        (status, Json(body)).into_response()
    }
}
