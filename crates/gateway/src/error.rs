//! Gateway-level error, aggregating crate errors at the API boundary
//! and mapping each kind to an HTTP status per spec.md §7's table.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Domain(#[from] wforce_domain::Error),

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("unsupported content-type")]
    UnsupportedMediaType,

    #[error("authentication failure")]
    Auth,

    #[error("worker queue full")]
    QueueFull,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, reason) = match &self {
            Error::Domain(wforce_domain::Error::Auth) => (StatusCode::UNAUTHORIZED, self.to_string()),
            Error::Domain(wforce_domain::Error::Malformed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            Error::Domain(wforce_domain::Error::Policy(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            Error::Domain(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Error::Malformed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Error::UnsupportedMediaType => (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string()),
            Error::Auth => (StatusCode::UNAUTHORIZED, self.to_string()),
            Error::QueueFull => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            Error::UnknownCommand(_) => (StatusCode::NOT_FOUND, self.to_string()),
        };

        if status == StatusCode::UNAUTHORIZED {
            return (
                status,
                [("WWW-Authenticate", "basic realm=\"wforce\"")],
                Json(json!({ "status": "failure", "reason": reason })),
            )
                .into_response();
        }

        (status, Json(json!({ "status": "failure", "reason": reason }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
