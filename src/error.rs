//! Top-level error type and the §7 error taxonomy.
//!
//! Each submodule owns its own `displaydoc` + `thiserror` `Error` enum and
//! converts into this one via `#[from]`, the way `auth::resource::Error`
//! converts into the teacher's `ApiError`. Background tasks (datasource
//! sync, extractor run, reconciler tick) log their own errors and never
//! let them reach this type; only request-rejected and deadline-exceeded
//! are caller visible, per the propagation policy in §7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use displaydoc::Display;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// configuration fault: {0}
    Config(#[from] crate::config::Error),

    /// database error: {0}
    Database(#[from] crate::db::Error),

    /// datasource error: {0}
    Datasource(#[from] crate::datasource::Error),

    /// extractor error: {0}
    Extractor(#[from] crate::extractor::Error),

    /// pipeline error: {0}
    Pipeline(#[from] crate::pipeline::Error),

    /// request rejected: {0}
    RequestRejected(String),

    /// pipeline run exceeded its deadline
    DeadlineExceeded,

    /// unexpected error: {0}
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    pub fn rejected(msg: impl std::fmt::Display) -> Self {
        Self::RequestRejected(msg.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::RequestRejected(_) => StatusCode::BAD_REQUEST,
            Error::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self, "request failed");
        (status, Json(self.to_string())).into_response()
    }
}
