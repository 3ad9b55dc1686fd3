//! Error taxonomy shared by the registry, the plan builder and the updater.
//!
//! Every failure reaching the HTTP surface is one of these variants; the
//! mapping to a status code lives in [`Error::status_code`] so handlers never
//! pick codes themselves.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request body or a missing/invalid field.
    #[error("{0}")]
    InvalidInput(String),

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("stop signal not valid: {0}")]
    InvalidStopSignal(String),

    /// Unknown token or unregistered service name.
    #[error("{0} not found")]
    NotFound(String),

    #[error("service {0} is already registered")]
    DuplicateService(String),

    /// The orchestrator does not know the service (or could not be asked).
    #[error("docker service could not be retrieved or non existent: {0}")]
    ServiceUnavailable(String),

    #[error("docker service {0} has no container spec")]
    MissingContainerSpec(String),

    /// The service changed between fetch and apply.
    #[error("service was modified concurrently: {0}")]
    Conflict(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::InvalidTokenFormat | Self::InvalidStopSignal(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateService(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) | Self::MissingContainerSpec(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Conflict(_)
            | Self::Orchestrator(_)
            | Self::Persistence(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
