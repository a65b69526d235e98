/// Profile route
///
/// Read access to the authenticated principal's profile. Claims are
/// injected by the access-token middleware; a store lookup maps the
/// subject id back to its record.
use actix_web::{web, HttpResponse};
use sqlx::PgPool;

use crate::auth::AccessClaims;
use crate::error::{AppError, TokenError};
use crate::users;

const MEDIA_URL_PREFIX: &str = "/media";

/// GET /api/auth/profile
///
/// # Errors
/// - 401: missing or invalid access token (handled by middleware), or a
///   token whose subject no longer exists
pub async fn profile(
    claims: web::ReqData<AccessClaims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = users::find_by_id(pool.get_ref(), &user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "access token for a deleted principal");
            AppError::Token(TokenError::Malformed)
        })?;

    let profile = users::find_profile(pool.get_ref(), &user_id)
        .await?
        .ok_or_else(|| AppError::Internal("principal has no profile row".to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "username": user.username,
        "email": user.email,
        "image": format!("{}/{}", MEDIA_URL_PREFIX, profile.image),
    })))
}
