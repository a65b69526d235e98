/// Refresh-token lifecycle.
///
/// The state machine per refresh credential is ISSUED -> ACTIVE ->
/// {ROTATED | REVOKED | EXPIRED}. Rotation mints a new jti rather than
/// reusing the old one; only an explicit revoke puts a jti on the
/// blacklist, so a rotated-away token stays independently valid until its
/// own expiry.
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::blacklist;
use crate::auth::jwt::{decode_refresh_token, generate_access_token, generate_refresh_token};
use crate::configuration::JwtSettings;
use crate::error::{AppError, TokenError};

const JTI_LENGTH: usize = 32;

// A slow revocation store must fail the validation, never pass it.
const BLACKLIST_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// An access/refresh credential pair, minted together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Generate a fresh unique token identifier.
fn generate_jti() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JTI_LENGTH)
        .map(char::from)
        .collect()
}

/// Mint an access/refresh pair for a subject.
///
/// The store is untouched: issuance is not tracked, only revocation is.
pub fn issue(user_id: &Uuid, config: &JwtSettings) -> Result<TokenPair, AppError> {
    let access = generate_access_token(user_id, config)?;
    let jti = generate_jti();
    let refresh = generate_refresh_token(user_id, &jti, config)?;

    tracing::debug!(user_id = %user_id, jti = %jti, "issued credential pair");

    Ok(TokenPair { access, refresh })
}

/// Validate a refresh token and return its subject.
///
/// Checks run cheapest first: signature/shape, then the expiry claim, then
/// the blacklist. The store lookup runs under a timeout and any store
/// failure is fail-closed.
pub async fn validate_refresh(
    pool: &PgPool,
    token: &str,
    config: &JwtSettings,
) -> Result<Uuid, TokenError> {
    let claims = decode_refresh_token(token, config)?;

    let lookup = tokio::time::timeout(
        BLACKLIST_LOOKUP_TIMEOUT,
        blacklist::is_revoked(pool, &claims.jti),
    )
    .await;

    match lookup {
        Ok(Ok(false)) => claims.user_id().map_err(|_| TokenError::Malformed),
        Ok(Ok(true)) => {
            tracing::warn!(jti = %claims.jti, sub = %claims.sub, "revoked refresh token presented");
            Err(TokenError::Revoked)
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "revocation lookup failed");
            Err(TokenError::StoreUnavailable)
        }
        Err(_) => {
            tracing::error!("revocation lookup timed out");
            Err(TokenError::StoreUnavailable)
        }
    }
}

/// Rotate a refresh token: validate it, then mint a fresh pair under a new
/// jti. The superseded jti is not blacklisted; several refresh tokens per
/// subject may be live at once and only logout revokes.
pub async fn rotate(
    pool: &PgPool,
    token: &str,
    config: &JwtSettings,
) -> Result<(Uuid, TokenPair), AppError> {
    let user_id = validate_refresh(pool, token, config).await?;
    let pair = issue(&user_id, config)?;

    tracing::info!(user_id = %user_id, "refresh token rotated");

    Ok((user_id, pair))
}

/// Revoke a refresh token: verify signature and expiry, then record its
/// jti with the token's own expiry as the entry lifetime. Prior revocation
/// is not checked; the insert is a no-op for an already-revoked jti.
pub async fn revoke(pool: &PgPool, token: &str, config: &JwtSettings) -> Result<(), AppError> {
    let claims = decode_refresh_token(token, config)?;
    let expires_at = claims
        .expires_at()
        .ok_or(AppError::Token(TokenError::Malformed))?;

    blacklist::revoke_jti(pool, &claims.jti, expires_at)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, jti = %claims.jti, "failed to record revocation");
            AppError::Token(TokenError::StoreUnavailable)
        })?;

    tracing::info!(jti = %claims.jti, sub = %claims.sub, "refresh token revoked");

    Ok(())
}
