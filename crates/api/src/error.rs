use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use leadforge_identity::{AuditError, AuthError, QuotaError, TokenError, ValidationError};
use serde::Serialize;
use tracing::{debug, error};
use utoipa::ToSchema;

const INTERNAL_MESSAGE: &str = "Something went wrong, please try again later";

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// Generic 500. The cause is logged here and never sent to the client.
    pub fn internal(cause: &dyn std::fmt::Debug) -> Self {
        error!(error = ?cause, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::bad_request(error.0)
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => Self::unauthorized("Invalid email or password"),
            AuthError::SessionNotFound | AuthError::SessionExpired | AuthError::InvalidSession => {
                debug!(reason = %error, "session rejected");
                Self::unauthorized("Unauthorized")
            }
            AuthError::UserExists => {
                Self::bad_request("An account with this email or username already exists")
            }
            AuthError::UserNotFound => Self::not_found("User not found"),
            AuthError::Validation(error) => error.into(),
            AuthError::Database(_) | AuthError::PasswordHash(_) => Self::internal(&error),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::InvalidToken => Self::bad_request("Invalid or expired token"),
            TokenError::MissingToken => Self::bad_request("Token is required"),
            TokenError::EmailTaken => Self::bad_request("Email address is already in use"),
            TokenError::UserNotFound => Self::not_found("User not found"),
            TokenError::Database(_) | TokenError::PasswordHash(_) | TokenError::Serialization(_) => {
                Self::internal(&error)
            }
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(error: QuotaError) -> Self {
        match error {
            QuotaError::UnknownPlan(_) | QuotaError::FreePlanOverride => {
                Self::bad_request(error.to_string())
            }
            QuotaError::Database(_) => Self::internal(&error),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(error: AuditError) -> Self {
        Self::internal(&error)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        Self::internal(&error)
    }
}
