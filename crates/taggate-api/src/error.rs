use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tracing::error;

use taggate_core::{CoreError, ErrorKind};
use taggate_types::api::ErrorResponse;

/// Error returned by every handler, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    retry_at: Option<DateTime<Utc>>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_at: None,
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        error!("internal error: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn retry_at(mut self, at: DateTime<Utc>) -> Self {
        self.retry_at = Some(at);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("error"))
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match err.kind() {
            ErrorKind::Authorization => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound | ErrorKind::FeatureDisabled => StatusCode::NOT_FOUND,
            ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Captcha | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Payment => StatusCode::PAYMENT_REQUIRED,
            ErrorKind::Internal => return Self::internal(format!("{:#}", anyhow::Error::from(err))),
        };
        Self {
            status,
            message: err.to_string(),
            retry_at: err.retry_at(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response();

        if let Some(at) = self.retry_at {
            let date = at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            if let Ok(value) = HeaderValue::from_str(&date) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
