//! API errors

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::store::PersistenceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    /// Login rejected. Deliberately says nothing about which part was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("User {0} not found")]
    NotFound(String),
    #[error("Document {0} not found")]
    DocumentNotFound(u32),
    #[error("Username {0} already exists")]
    DuplicateUser(String),
    #[error("Users document changed since revision {0}")]
    Conflict(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Internal error")]
    Internal(String),
}

impl From<subscriptions::Error> for Error {
    fn from(err: subscriptions::Error) -> Self {
        use subscriptions::Error::*;

        match err {
            Validation(msg) => Self::Validation(msg),
            NotFound(username) => Self::NotFound(username),
            DuplicateUser(username) => Self::DuplicateUser(username),
        }
    }
}

impl From<color_eyre::Report> for Error {
    fn from(err: color_eyre::Report) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) | Self::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateUser(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal details end up in logs, not in responses
        let message = match self {
            Self::Internal(details) => {
                tracing::error!(%details, "Request failed");
                self.to_string()
            }
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": message,
        }))
    }
}
