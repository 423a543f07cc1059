//! Error taxonomy for the marketplace domain

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the marketplace services
///
/// Dispatch sink failures never appear here: the notification engine
/// absorbs them.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Malformed input (bad UUID, constraint on a field)
    #[error("{0}")]
    Validation(String),

    /// A referenced user, category or product does not exist
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness rule rejected the write
    #[error("{0}")]
    Conflict(String),

    /// Missing, invalid or expired credential, or inactive subject
    #[error("{0}")]
    Unauthorized(String),

    /// Valid credential without the required role
    #[error("{0}")]
    Forbidden(String),

    /// Too many failed attempts for the same key
    #[error("{0}")]
    RateLimited(String),

    /// Anything unexpected; the detail is logged, never returned
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    pub fn not_found(entity: &str, term: impl std::fmt::Display) -> Self {
        MarketError::NotFound(format!("{} '{}' not found", entity, term))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            MarketError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
            MarketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            MarketError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DatabaseError> for MarketError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(constraint) => {
                MarketError::Conflict(format!("Resource already exists ({})", constraint))
            }
            DatabaseError::ForeignKeyViolation(constraint) => MarketError::Conflict(format!(
                "Resource is still referenced or references a missing row ({})",
                constraint
            )),
            other => MarketError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for MarketError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::from(err).into()
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            MarketError::Internal(detail) => {
                error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for marketplace results
pub type MarketResult<T> = Result<T, MarketError>;
