//! Errors surfaced by service operations and their HTTP mapping.

use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tripmate_storage::StoreError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    MissingFields(String),

    #[error("Invite is no longer valid")]
    Gone,

    #[error("Invite has expired")]
    Expired,

    #[error("Invite has reached its usage limit")]
    Exhausted,

    #[error("Invite is no longer active")]
    Inactive,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    RateLimited(String),

    /// Details go to the log, never to the caller.
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::MissingFields(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Gone | Self::Expired => StatusCode::GONE,
            Self::Exhausted | Self::Inactive | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Log an unexpected failure and collapse it to `Internal`.
    pub fn internal(context: &str, err: impl Display) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal
    }

    /// Map a store failure: `NotFound` becomes a 404 with `what` in the message,
    /// anything else is logged and becomes `Internal`.
    pub fn store(what: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |err| match err {
            StoreError::NotFound => Self::NotFound(format!("{what} not found")),
            other => Self::internal(&format!("store failure loading {what}"), other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
