use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// JSON envelope wrapped around every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub response: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(response: T) -> Self {
        Self {
            status: "success",
            response,
        }
    }
}

impl Envelope<String> {
    fn failed(message: String) -> Self {
        Self {
            status: "failed",
            response: message,
        }
    }
}

/// Failures surfaced to API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("You must be logged in to access this resource.")]
    Unauthorized,
    #[error("You do not have permission to access this resource.")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Internal(e) => {
                error!("Request failed: {e:#}");
                "An internal error occurred.".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(Envelope::failed(message))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Wrap a payload in a success envelope.
#[allow(clippy::unnecessary_wraps)]
pub fn ok<T: Serialize>(response: T) -> ApiResult<T> {
    Ok(Json(Envelope::success(response)))
}
