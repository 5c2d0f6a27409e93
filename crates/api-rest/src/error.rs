//! Mapping of failures onto HTTP responses.
//!
//! Client errors carry their message; internal failures are logged in full and answered with
//! a generic body so storage details never leave the server.

use api_shared::dto::error_code;
use api_shared::{AuthError, ErrorBody};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use opencare_core::CoreError;

/// Seconds a client should wait before retrying a busy store.
pub const RETRY_AFTER_SECS: u64 = 1;

const SERVER_ERROR: &str = "A server error occurred.";

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    Auth(AuthError),
    /// Request body or query string could not be parsed.
    BadRequest(String),
    /// Failure outside the core, such as a panicked blocking task.
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Core(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(err) => match err {
                CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                CoreError::NotFound { .. } | CoreError::InvalidPage(_) => StatusCode::NOT_FOUND,
                CoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
                CoreError::Permission(_) => StatusCode::FORBIDDEN,
                CoreError::Conflict(_) => StatusCode::CONFLICT,
                CoreError::Busy => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Auth(AuthError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Core(err) => {
                let code = error_code(err);
                match err {
                    CoreError::Validation(fields) => {
                        ErrorBody::new(code, "Invalid input.").with_fields(fields)
                    }
                    CoreError::InvalidPage(_) => ErrorBody::new(code, "Invalid page."),
                    CoreError::Unauthenticated => ErrorBody::new(
                        code,
                        "Authentication credentials were not provided or are invalid.",
                    ),
                    CoreError::Permission(_) => ErrorBody::new(
                        code,
                        "You do not have permission to perform this action.",
                    ),
                    CoreError::NotFound { .. } | CoreError::Conflict(_) | CoreError::Busy => {
                        ErrorBody::new(code, err.to_string())
                    }
                    _ => ErrorBody::new(code, SERVER_ERROR),
                }
            }
            ApiError::Auth(AuthError::Config(_)) | ApiError::Internal(_) => {
                ErrorBody::new("server_error", SERVER_ERROR)
            }
            ApiError::Auth(err) => ErrorBody::new("not_authenticated", err.to_string()),
            ApiError::BadRequest(message) => ErrorBody::new("parse_error", message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed ({}): {:?}", status, self);
        } else {
            tracing::warn!("request rejected ({}): {:?}", status, self);
        }

        let mut response = (status, Json(self.body())).into_response();
        match status {
            StatusCode::SERVICE_UNAVAILABLE => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
            }
            StatusCode::UNAUTHORIZED => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }
        response
    }
}
