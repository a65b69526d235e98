/// Refresh-token revocation blacklist.
///
/// Issuance is never tracked; only revocation is, which keeps the store
/// write-only and bounded by the refresh lifetime. Each entry carries the
/// revoked token's own expiry, so an entry never needs to outlive the
/// token it blocks and the sweeper can drop it afterwards.
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Check whether a jti has been revoked.
pub async fn is_revoked(pool: &PgPool, jti: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE jti = $1)")
        .bind(jti)
        .fetch_one(pool)
        .await
}

/// Insert a revocation entry for a jti.
///
/// Idempotent: revoking an already-revoked jti is a no-op. The
/// insert-if-absent is atomic at the database, so a concurrent validation
/// of the same jti either sees the entry or linearizes before it.
pub async fn revoke_jti(
    pool: &PgPool,
    jti: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO token_blacklist (jti, expires_at, revoked_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (jti) DO NOTHING
        "#,
    )
    .bind(jti)
    .bind(expires_at)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove entries whose expiry is at or before `now`; returns the count.
///
/// Safe to run concurrently with validation: only strictly expired entries
/// go, and validation rejects expired-claim tokens before it ever consults
/// the store, so a swept entry can never cause a false "not revoked".
pub async fn sweep_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Start the periodic sweeper on its own task.
pub fn spawn_sweeper(pool: PgPool, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match sweep_expired(&pool, Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::info!(removed, "swept expired blacklist entries");
                }
                Err(e) => {
                    tracing::error!(error = %e, "blacklist sweep failed");
                }
            }
        }
    });
}
