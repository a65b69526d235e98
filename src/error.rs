/// Error Handling Module
///
/// Unified error handling for the credential subsystem:
/// 1. Domain-specific error types (validation, registration, tokens, database)
/// 2. A central `AppError` used for control flow
/// 3. HTTP response mapping via actix's `ResponseError`
///
/// The outward-facing shapes are deliberate:
/// - login failures collapse into one fixed 401 body, so callers cannot
///   probe which part of the credential pair was wrong;
/// - refresh/logout token failures collapse into one flat 401 body, while
///   the malformed/expired/revoked distinction is kept for logging;
/// - registration failures are a field-keyed map, 409 when any field is a
///   uniqueness conflict and 400 otherwise.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// Fixed body of every login failure.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Wrong email or password";

/// Fixed description of every refresh-token failure.
pub const UNAUTHENTICATED_DESCRIPTION: &str = "Token is invalid or expired";

/// Validation errors for identity input (email, username)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// What went wrong with a single registration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldIssue {
    Invalid,
    Taken,
}

/// Field-keyed registration outcome, inspected directly by the gateway.
/// Empty means the submission passed; otherwise every offending field
/// carries its issue and all of them are reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationErrors {
    pub email: Option<FieldIssue>,
    pub username: Option<FieldIssue>,
}

impl RegistrationErrors {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.username.is_none()
    }

    /// A uniqueness conflict on any field upgrades the response to 409.
    pub fn has_conflict(&self) -> bool {
        self.email == Some(FieldIssue::Taken) || self.username == Some(FieldIssue::Taken)
    }

    fn field_map(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(issue) = self.email {
            let message = match issue {
                FieldIssue::Invalid => "Invalid Email",
                FieldIssue::Taken => "Email already taken",
            };
            map.insert("email".to_string(), message.into());
        }
        if let Some(issue) = self.username {
            let message = match issue {
                FieldIssue::Invalid => "Invalid Username",
                FieldIssue::Taken => "Username already taken",
            };
            map.insert("username".to_string(), message.into());
        }
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for RegistrationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration rejected: {}", self.field_map())
    }
}

impl StdError for RegistrationErrors {}

/// Refresh-token validation failures.
///
/// The distinction is internal only: every kind maps to the same 401
/// response, but the kind is logged for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// No token was presented at all.
    Missing,
    /// The token could not be parsed or its signature did not verify.
    Malformed,
    /// The expiry claim is in the past.
    Expired,
    /// The token's jti is present in the blacklist.
    Revoked,
    /// The blacklist could not be consulted in time; treated as
    /// unauthenticated (fail-closed), never as valid.
    StoreUnavailable,
}

impl TokenError {
    /// Stable label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Missing => "missing",
            TokenError::Malformed => "malformed",
            TokenError::Expired => "expired",
            TokenError::Revoked => "revoked",
            TokenError::StoreUnavailable => "store_unavailable",
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Missing => write!(f, "no refresh token presented"),
            TokenError::Malformed => write!(f, "token is malformed or has a bad signature"),
            TokenError::Expired => write!(f, "token has expired"),
            TokenError::Revoked => write!(f, "token has been revoked"),
            TokenError::StoreUnavailable => write!(f, "revocation store unavailable"),
        }
    }
}

impl StdError for TokenError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Registration(RegistrationErrors),
    /// Login-path failure: identity and secret mismatches are merged on
    /// purpose, so the response never reveals which one was wrong.
    InvalidCredentials,
    Token(TokenError),
    Database(DatabaseError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Registration(e) => write!(f, "{}", e),
            AppError::InvalidCredentials => write!(f, "invalid credentials"),
            AppError::Token(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<RegistrationErrors> for AppError {
    fn from(err: RegistrationErrors) -> Self {
        AppError::Registration(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Token(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let error_msg = err.to_string();

        if error_msg.contains("duplicate key") || error_msg.contains("unique constraint") {
            AppError::Database(DatabaseError::UniqueConstraintViolation(error_msg))
        } else if error_msg.contains("no rows") {
            AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
        } else if error_msg.contains("pool") || error_msg.contains("connect") {
            AppError::Database(DatabaseError::ConnectionPool(error_msg))
        } else {
            AppError::Database(DatabaseError::UnexpectedError(error_msg))
        }
    }
}

impl AppError {
    fn log(&self) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error = %e, "Validation error");
            }
            AppError::Registration(e) => {
                tracing::warn!(error = %e, conflict = e.has_conflict(), "Registration rejected");
            }
            AppError::InvalidCredentials => {
                tracing::warn!("Invalid credentials attempt");
            }
            AppError::Token(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "Refresh token rejected");
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.log();

        match self {
            AppError::Validation(e) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": e.to_string(),
            })),
            AppError::Registration(e) => {
                let body = serde_json::json!({ "error": e.field_map() });
                if e.has_conflict() {
                    HttpResponse::Conflict().json(body)
                } else {
                    HttpResponse::BadRequest().json(body)
                }
            }
            AppError::InvalidCredentials => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": INVALID_CREDENTIALS_MESSAGE,
            })),
            AppError::Token(_) => HttpResponse::Unauthorized().json(serde_json::json!({
                "description": UNAUTHENTICATED_DESCRIPTION,
            })),
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => {
                    HttpResponse::Conflict().json(serde_json::json!({
                        "error": "Duplicate entry",
                    }))
                }
                DatabaseError::ConnectionPool(_) => {
                    HttpResponse::ServiceUnavailable().json(serde_json::json!({
                        "error": "Service temporarily unavailable",
                    }))
                }
                _ => HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Database error occurred",
                })),
            },
            AppError::Internal(_) => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error",
            })),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Registration(e) => {
                if e.has_conflict() {
                    StatusCode::CONFLICT
                } else {
                    StatusCode::BAD_REQUEST
                }
            }
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                DatabaseError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
