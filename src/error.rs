//! Crate-wide error taxonomy.
//!
//! The external HTTP surface is intentionally opaque: callers never see
//! `Display` text for `BadRequest`/`NotFound`, only a status code.

use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad request")]
    BadRequest,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    /// Push dispatch failed. Never surfaced to a caller directly - the
    /// Coordinator absorbs this and keeps waiting until the deadline.
    #[error("push transport failure: {0}")]
    TransportFailure(String),

    /// Auth backend or shared cache unreachable.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        match &self {
            Error::BadRequest => StatusCode::BAD_REQUEST.into_response(),
            Error::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
            Error::Forbidden => StatusCode::FORBIDDEN.into_response(),
            Error::NotFound => StatusCode::NOT_FOUND.into_response(),
            Error::TransportFailure(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            Error::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            Error::Internal(msg) => {
                tracing::error!(error = %msg, "unclassified internal error");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
