/// Authentication Routes
///
/// The gateway over the credential subsystem: login, registration, token
/// refresh and logout. It composes the canonicalizer, the user store and
/// the token service; the refresh credential travels only in a scoped
/// HTTP-only cookie, the access credential only in response bodies.
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::{hash_password, issue, revoke, rotate, verify_password};
use crate::configuration::JwtSettings;
use crate::error::{
    AppError, FieldIssue, RegistrationErrors, TokenError, UNAUTHENTICATED_DESCRIPTION,
};
use crate::users;
use crate::validators::{canonicalize_email, validate_username};

pub const REFRESH_COOKIE_NAME: &str = "refresh-token";

/// The refresh cookie never leaves the auth path prefix.
const AUTH_COOKIE_PATH: &str = "/api/auth/";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Body of every successful login/register/refresh response. The refresh
/// credential is deliberately absent: it rides the cookie.
#[derive(Serialize)]
pub struct SessionResponse {
    pub username: String,
    pub access: String,
}

fn refresh_cookie(token: &str) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE_NAME, token.to_string())
        .path(AUTH_COOKIE_PATH)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .finish()
}

/// Expired cookie on the same scope, instructing the client to drop it.
fn clear_refresh_cookie() -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE_NAME, "")
        .path(AUTH_COOKIE_PATH)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::ZERO)
        .finish()
}

/// POST /api/auth/login
///
/// Authenticate a principal by email and password.
///
/// # Errors
/// - 401: wrong email, wrong password, or an email that does not even
///   parse. One failure, one body; the response never reveals which
///   check failed.
/// - 500: user store failure
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    // A malformed email cannot belong to an account; report it exactly as
    // a wrong password would be.
    let email = canonicalize_email(&form.email).map_err(|_| AppError::InvalidCredentials)?;

    let user = users::find_by_email(pool.get_ref(), &email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&form.password, &user.password_hash)? {
        tracing::warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let pair = issue(&user.id, jwt_config.get_ref())?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&pair.refresh))
        .json(SessionResponse {
            username: user.username,
            access: pair.access,
        }))
}

/// POST /api/auth/register
///
/// Create a principal and hand it a first credential pair.
///
/// # Errors
/// - 409: email and/or username already taken; both fields reported
///   together when both conflict
/// - 400: email and/or username malformed
/// - 500: user store failure
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let mut errors = RegistrationErrors::default();

    let email = match canonicalize_email(&form.email) {
        Ok(email) => Some(email),
        Err(e) => {
            tracing::debug!(error = %e, "rejected registration email");
            errors.email = Some(FieldIssue::Invalid);
            None
        }
    };
    let username = match validate_username(&form.username) {
        Ok(username) => Some(username),
        Err(e) => {
            tracing::debug!(error = %e, "rejected registration username");
            errors.username = Some(FieldIssue::Invalid);
            None
        }
    };

    // Advisory uniqueness pre-checks; the UNIQUE constraints at insert
    // time remain the arbiter under concurrent submissions.
    if let Some(email) = email.as_deref() {
        if users::email_exists(pool.get_ref(), email).await? {
            errors.email = Some(FieldIssue::Taken);
        }
    }
    if let Some(username) = username.as_deref() {
        if users::username_exists(pool.get_ref(), username).await? {
            errors.username = Some(FieldIssue::Taken);
        }
    }

    let (email, username) = match (email, username) {
        (Some(email), Some(username)) if errors.is_empty() => (email, username),
        _ => return Err(AppError::Registration(errors)),
    };

    let password_hash = hash_password(&form.password)?;
    let user = users::create_user(pool.get_ref(), &email, &username, &password_hash).await?;

    let pair = issue(&user.id, jwt_config.get_ref())?;

    tracing::info!(user_id = %user.id, "user registered");

    Ok(HttpResponse::Created()
        .cookie(refresh_cookie(&pair.refresh))
        .json(SessionResponse {
            username: user.username,
            access: pair.access,
        }))
}

/// POST /api/auth/refresh
///
/// Rotate the refresh credential from the scoped cookie and return a new
/// access credential.
///
/// # Errors
/// - 401: cookie absent (reported without touching the revocation
///   store), or the token is malformed/expired/revoked; one flat body
///   for all of them
pub async fn refresh(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let cookie = req
        .cookie(REFRESH_COOKIE_NAME)
        .ok_or(AppError::Token(TokenError::Missing))?;

    let (user_id, pair) = rotate(pool.get_ref(), cookie.value(), jwt_config.get_ref()).await?;

    let user = users::find_by_id(pool.get_ref(), &user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "refresh for a deleted principal");
            AppError::Token(TokenError::Malformed)
        })?;

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&pair.refresh))
        .json(SessionResponse {
            username: user.username,
            access: pair.access,
        }))
}

/// POST /api/auth/logout
///
/// Revoke the refresh credential from the scoped cookie. The cookie is
/// cleared whenever one was presented, even when revocation fails;
/// clearing is best-effort and never the reason a logout fails.
///
/// # Errors
/// - 401: cookie absent, or the token could not be revoked (cookie is
///   still cleared in the latter case)
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let cookie = req
        .cookie(REFRESH_COOKIE_NAME)
        .ok_or(AppError::Token(TokenError::Missing))?;

    match revoke(pool.get_ref(), cookie.value(), jwt_config.get_ref()).await {
        Ok(()) => Ok(HttpResponse::NoContent()
            .cookie(clear_refresh_cookie())
            .finish()),
        Err(e) => {
            tracing::warn!(error = %e, "logout could not revoke the presented token");
            Ok(HttpResponse::Unauthorized()
                .cookie(clear_refresh_cookie())
                .json(serde_json::json!({
                    "description": UNAUTHENTICATED_DESCRIPTION,
                })))
        }
    }
}
