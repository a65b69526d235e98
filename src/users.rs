/// User and profile record store.
///
/// Keyed access to the `users` and `profiles` tables: create, lookup,
/// update and delete. Profile creation is an explicit hook invoked inside
/// the same transaction as user creation, so a principal never exists
/// without its profile; deletion cascades through the foreign key.
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, FieldIssue, RegistrationErrors};

const DEFAULT_PROFILE_IMAGE: &str = "default.jpg";

/// A principal: identity, password material, display handle, role flags.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRecord {
    pub user_id: Uuid,
    pub image: String,
}

/// Create a principal with its profile.
///
/// The uniqueness pre-checks in the gateway are advisory; the UNIQUE
/// constraints on `users` are the true arbiter, and a violation at insert
/// time is mapped back to the same field-keyed registration error the
/// pre-checks would have produced.
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    username: &str,
    password_hash: &str,
) -> Result<UserRecord, AppError> {
    let user_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO users (id, email, username, password_hash, is_staff, is_superuser, created_at, updated_at)
        VALUES ($1, $2, $3, $4, FALSE, FALSE, $5, $5)
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(username)
    .bind(password_hash)
    .bind(now)
    .execute(&mut tx)
    .await
    .map_err(map_unique_violation)?;

    create_profile(&mut tx, user_id).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, "user created");

    Ok(UserRecord {
        id: user_id,
        email: email.to_string(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        is_staff: false,
        is_superuser: false,
    })
}

/// Post-create hook: every new principal gets a profile row, created
/// synchronously in the caller's transaction.
async fn create_profile(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, image, created_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(DEFAULT_PROFILE_IMAGE)
    .bind(chrono::Utc::now())
    .execute(&mut *tx)
    .await?;

    Ok(())
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>, AppError> {
    let user = sqlx::query_as::<_, UserRecord>(
        r#"
        SELECT id, email, username, password_hash, is_staff, is_superuser
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn find_by_id(pool: &PgPool, user_id: &Uuid) -> Result<Option<UserRecord>, AppError> {
    let user = sqlx::query_as::<_, UserRecord>(
        r#"
        SELECT id, email, username, password_hash, is_staff, is_superuser
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, AppError> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(pool)
        .await?;

    Ok(exists)
}

pub async fn username_exists(pool: &PgPool, username: &str) -> Result<bool, AppError> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(pool)
            .await?;

    Ok(exists)
}

/// Owner-initiated display-handle change.
pub async fn update_username(
    pool: &PgPool,
    user_id: &Uuid,
    username: &str,
) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET username = $1, updated_at = $2 WHERE id = $3")
        .bind(username)
        .bind(chrono::Utc::now())
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(map_unique_violation)?;

    Ok(())
}

/// Delete a principal; the profile row goes with it through the cascade.
pub async fn delete_user(pool: &PgPool, user_id: &Uuid) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        tracing::info!(user_id = %user_id, "user deleted");
        Ok(true)
    } else {
        Ok(false)
    }
}

pub async fn find_profile(pool: &PgPool, user_id: &Uuid) -> Result<Option<ProfileRecord>, AppError> {
    let profile = sqlx::query_as::<_, ProfileRecord>(
        "SELECT user_id, image FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Translate a UNIQUE violation on the users table into the field-keyed
/// registration error; anything else falls through to the generic mapping.
fn map_unique_violation(err: sqlx::Error) -> AppError {
    let message = err.to_string();

    if message.contains("users_email_key") {
        return AppError::Registration(RegistrationErrors {
            email: Some(FieldIssue::Taken),
            username: None,
        });
    }
    if message.contains("users_username_key") {
        return AppError::Registration(RegistrationErrors {
            email: None,
            username: Some(FieldIssue::Taken),
        });
    }

    err.into()
}
