//! Error bodies for the HTTP API.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{ClientError, ReportError};

/// Body of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Human-readable cause.
    pub error: String,
}

/// Failures a handler can return.
#[derive(Debug)]
pub enum ApiError {
    /// The request body was missing or malformed.
    BadRequest(String),
    /// The requested resource does not exist.
    NotFound(String),
    /// The notebook client failed.
    Client(ClientError),
    /// A report file could not be read.
    Report(ReportError),
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        Self::Client(err)
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        Self::Report(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Renders an error with its sources, outermost first.
fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Client(err) => {
                tracing::error!(error = %err, "Notebook request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, describe(&err))
            }
            Self::Report(err) => {
                tracing::error!(error = %err, "Report file unavailable");
                (StatusCode::INTERNAL_SERVER_ERROR, describe(&err))
            }
        };

        let body = Json(ErrorBody {
            success: false,
            error: message,
        });

        (status, body).into_response()
    }
}
