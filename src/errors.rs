use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use sqlx::Error as SqlxError;
use std::env::VarError;
use thiserror::Error;

use crate::{
    catalog::{ItemStatus, ParseEnumError, SwapStatus},
    storage::StorageError,
    structs::{ItemValidationError, RowError},
};

/// Authentication failure codes, in the shape the identity provider reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    EmailInUse,
    InvalidEmail,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    TooManyRequests,
    Other,
}

impl AuthErrorCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "auth/email-already-in-use" => AuthErrorCode::EmailInUse,
            "auth/invalid-email" => AuthErrorCode::InvalidEmail,
            "auth/weak-password" => AuthErrorCode::WeakPassword,
            "auth/user-not-found" => AuthErrorCode::UserNotFound,
            "auth/wrong-password" => AuthErrorCode::WrongPassword,
            "auth/too-many-requests" => AuthErrorCode::TooManyRequests,
            _ => AuthErrorCode::Other,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorCode::EmailInUse => "auth/email-already-in-use",
            AuthErrorCode::InvalidEmail => "auth/invalid-email",
            AuthErrorCode::WeakPassword => "auth/weak-password",
            AuthErrorCode::UserNotFound => "auth/user-not-found",
            AuthErrorCode::WrongPassword => "auth/wrong-password",
            AuthErrorCode::TooManyRequests => "auth/too-many-requests",
            AuthErrorCode::Other => "auth/internal-error",
        }
    }

    /// Text shown to the user. Unknown codes share one generic message.
    pub fn friendly_message(&self) -> &'static str {
        match self {
            AuthErrorCode::EmailInUse => "An account with this email already exists.",
            AuthErrorCode::InvalidEmail => "Please enter a valid email address.",
            AuthErrorCode::WeakPassword => {
                "Password must be 12-128 characters and mix letters, numbers and symbols."
            }
            AuthErrorCode::UserNotFound => "No account found with this email.",
            AuthErrorCode::WrongPassword => "Incorrect password.",
            AuthErrorCode::TooManyRequests => "Too many attempts. Please try again later.",
            AuthErrorCode::Other => "Something went wrong. Please try again.",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt record: {0}")]
    CorruptRecord(#[from] RowError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{}", .0.friendly_message())]
    Auth(AuthErrorCode),

    #[error("Please log in first")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    InvalidItem(#[from] ItemValidationError),

    #[error(transparent)]
    InvalidValue(#[from] ParseEnumError),

    #[error("Not enough points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("Item cannot move from {from} to {to}")]
    ItemTransition { from: ItemStatus, to: ItemStatus },

    #[error("Request cannot move from {from} to {to}")]
    SwapTransition { from: SwapStatus, to: SwapStatus },

    #[error("Item is not available")]
    ItemUnavailable,

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Password error: {0}")]
    PasswordError(String),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] VarError),
}

impl From<actix_session::SessionInsertError> for AppError {
    fn from(err: actix_session::SessionInsertError) -> Self {
        AppError::SessionError(err.to_string())
    }
}

impl From<actix_session::SessionGetError> for AppError {
    fn from(err: actix_session::SessionGetError) -> Self {
        AppError::SessionError(err.to_string())
    }
}

impl From<actix_identity::error::GetIdentityError> for AppError {
    fn from(err: actix_identity::error::GetIdentityError) -> Self {
        AppError::SessionError(err.to_string())
    }
}

impl From<actix_identity::error::LoginError> for AppError {
    fn from(err: actix_identity::error::LoginError) -> Self {
        AppError::SessionError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Auth(AuthErrorCode::Other) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(AuthErrorCode::TooManyRequests) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Auth(AuthErrorCode::UserNotFound | AuthErrorCode::WrongPassword) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Auth(AuthErrorCode::EmailInUse) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::InvalidItem(_) | AppError::InvalidValue(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::InsufficientPoints { .. }
            | AppError::ItemTransition { .. }
            | AppError::SwapTransition { .. }
            | AppError::ItemUnavailable => StatusCode::CONFLICT,
            AppError::StorageError(StorageError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::StorageError(StorageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::DatabaseError(_)
            | AppError::MigrateError(_)
            | AppError::CorruptRecord(_)
            | AppError::StorageError(_)
            | AppError::PasswordError(_)
            | AppError::TemplateError(_)
            | AppError::SessionError(_)
            | AppError::ConfigError(_)
            | AppError::IoError(_)
            | AppError::EnvVarError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
            // internals stay in the log
            return HttpResponse::build(status).body("Internal server error");
        }
        HttpResponse::build(status).body(self.to_string())
    }
}

impl From<AppError> for std::io::Error {
    fn from(err: AppError) -> Self {
        std::io::Error::other(err.to_string())
    }
}
