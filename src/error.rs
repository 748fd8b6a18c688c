use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Coarse failure taxonomy shared by every service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    DomainViolation,
    Transient,
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("username is already taken")]
    UsernameTaken,
    #[error("email is already registered")]
    EmailTaken,
    #[error("password must be at least 8 characters and contain a digit and one of !@#$%^&*")]
    WeakPassword,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("invalid {0}: must be 1 to 64 characters without NUL")]
    InvalidName(&'static str),
    #[error("unknown user")]
    UnknownUser,
    #[error("account is inactive")]
    InactiveAccount,
    #[error("bad credentials")]
    BadCredentials,
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    DomainViolation(String),
    #[error("storage unavailable: {0}")]
    Transient(#[source] anyhow::Error),
    #[error("fatal: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::UsernameTaken | AppError::EmailTaken => ErrorKind::Conflict,
            AppError::WeakPassword
            | AppError::InvalidEmail
            | AppError::InvalidName(_)
            | AppError::DomainViolation(_) => ErrorKind::DomainViolation,
            AppError::UnknownUser
            | AppError::InactiveAccount
            | AppError::BadCredentials
            | AppError::Unauthenticated => ErrorKind::Unauthenticated,
            AppError::Forbidden => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Transient(_) => ErrorKind::Transient,
            AppError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Machine-readable reason shown next to the kind.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::UsernameTaken => "UsernameTaken",
            AppError::EmailTaken => "EmailTaken",
            AppError::WeakPassword => "WeakPassword",
            AppError::InvalidEmail => "InvalidEmail",
            AppError::InvalidName(_) => "InvalidName",
            AppError::UnknownUser | AppError::InactiveAccount | AppError::BadCredentials => {
                "InvalidCredentials"
            }
            AppError::Unauthenticated => "Unauthenticated",
            AppError::Forbidden => "Forbidden",
            AppError::NotFound(_) => "NotFound",
            AppError::DomainViolation(_) => "DomainViolation",
            AppError::Transient(_) => "Transient",
            AppError::Fatal(_) => "Fatal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::DomainViolation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show across the trust boundary.
    fn public_message(&self) -> String {
        match self {
            AppError::UnknownUser | AppError::InactiveAccount | AppError::BadCredentials => {
                "invalid credentials".into()
            }
            AppError::Transient(_) => "service temporarily unavailable, retry later".into(),
            AppError::Fatal(_) => "internal error".into(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Transient(e.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::DomainViolation(rejection.body_text())
    }
}

// Path parameters are only task ids; one that does not parse names no task.
impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        AppError::NotFound("task")
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::DomainViolation(rejection.body_text())
    }
}

/// `Json` whose rejection renders through `AppError`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    reason: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self.kind(), ErrorKind::Transient | ErrorKind::Fatal) {
            error!(error = ?self, "request failed");
        }
        let body = ErrorBody {
            kind: self.kind(),
            reason: self.reason(),
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
