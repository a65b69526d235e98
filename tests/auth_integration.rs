use auth_server::auth::{is_revoked, revoke_jti, sweep_expired};
use auth_server::configuration::{get_configuration, DatabaseSettings};
use auth_server::startup::run;
use auth_server::users;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool, Row};
use std::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let jwt_config = configuration.jwt.clone();
    let server = run(listener, connection_pool.clone(), jwt_config).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

fn refresh_cookie_value(response: &reqwest::Response) -> Option<String> {
    response
        .cookies()
        .find(|c| c.name() == "refresh-token")
        .map(|c| c.value().to_string())
}

async fn register_user(app: &TestApp, email: &str, username: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(&format!("{}/api/auth/register", &app.address))
        .json(&json!({
            "email": email,
            "username": username,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request.")
}

async fn login_user(app: &TestApp, email: &str, password: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(&format!("{}/api/auth/login", &app.address))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to execute request.")
}

// --- Registration ---

#[tokio::test]
async fn register_returns_201_with_access_token_and_refresh_cookie() {
    let app = spawn_app().await;

    let response = register_user(&app, "john@example.com", "john").await;

    assert_eq!(201, response.status().as_u16());

    let cookie = response
        .cookies()
        .find(|c| c.name() == "refresh-token")
        .expect("No refresh cookie set");
    assert!(!cookie.value().is_empty());
    assert!(cookie.http_only());
    assert_eq!(cookie.path(), Some("/api/auth/"));

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["username"], "john");
    assert!(body.get("access").is_some());
    // The refresh credential must ride the cookie only.
    assert!(body.get("refresh").is_none());

    let row = sqlx::query("SELECT email, username FROM users WHERE username = 'john'")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch created user");
    assert_eq!(row.get::<String, _>("email"), "john@example.com");
}

#[tokio::test]
async fn register_canonicalizes_provider_aliases() {
    let app = spawn_app().await;

    let response = register_user(&app, "new.user+promo@gmail.com", "nu").await;
    assert_eq!(201, response.status().as_u16());

    // The alias folds to the canonical mailbox before storage.
    let stored = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE username = 'nu'")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch created user");
    assert_eq!(stored, "newuser@gmail.com");

    // The canonical form is now taken, whatever alias spells it.
    let response = register_user(&app, "newuser@gmail.com", "other").await;
    assert_eq!(409, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"]["email"], "Email already taken");

    let response = register_user(&app, "n.e.w.user@gmail.com", "third").await;
    assert_eq!(409, response.status().as_u16());
}

#[tokio::test]
async fn register_reports_taken_email_and_username_together() {
    let app = spawn_app().await;

    assert_eq!(
        201,
        register_user(&app, "taken@example.com", "taken").await.status().as_u16()
    );

    let response = register_user(&app, "taken@example.com", "taken").await;
    assert_eq!(409, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"]["email"], "Email already taken");
    assert_eq!(body["error"]["username"], "Username already taken");
}

#[tokio::test]
async fn register_returns_400_for_invalid_fields() {
    let app = spawn_app().await;

    let test_cases = vec![
        ("not-an-email", "fine", "email", "Invalid Email"),
        ("a@b@c", "fine", "email", "Invalid Email"),
        ("+alias@gmail.com", "fine", "email", "Invalid Email"),
        ("fine@example.com", "", "username", "Invalid Username"),
        (
            "fine@example.com",
            "way-too-long-for-a-handle",
            "username",
            "Invalid Username",
        ),
    ];

    for (email, username, field, message) in test_cases {
        let response = register_user(&app, email, username).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject email={} username={}",
            email,
            username
        );
        let body: Value = response.json().await.expect("Failed to parse response");
        assert_eq!(body["error"][field], message);
    }
}

#[tokio::test]
async fn taken_field_wins_over_invalid_field_in_the_status() {
    let app = spawn_app().await;

    assert_eq!(
        201,
        register_user(&app, "winner@example.com", "winner").await.status().as_u16()
    );

    // Invalid email plus taken username: conflict decides the status and
    // both fields are reported.
    let response = register_user(&app, "garbage", "winner").await;
    assert_eq!(409, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"]["email"], "Invalid Email");
    assert_eq!(body["error"]["username"], "Username already taken");
}

// --- Login ---

#[tokio::test]
async fn login_returns_200_with_access_token_and_refresh_cookie() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    let response = login_user(&app, "john@example.com", "password123").await;

    assert_eq!(200, response.status().as_u16());
    assert!(refresh_cookie_value(&response).is_some());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["username"], "john");
    assert!(body.get("access").is_some());
}

#[tokio::test]
async fn login_failures_share_one_401_body() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    // Wrong password, unknown account, empty email, unparseable email:
    // indistinguishable from the outside.
    let attempts = vec![
        ("john@example.com", "wrong-password"),
        ("nobody@example.com", "password123"),
        ("", "password123"),
        ("not-an-email", "password123"),
    ];

    for (email, password) in attempts {
        let response = login_user(&app, email, password).await;

        assert_eq!(
            401,
            response.status().as_u16(),
            "email={} password={}",
            email,
            password
        );
        assert!(refresh_cookie_value(&response).is_none());
        let body: Value = response.json().await.expect("Failed to parse response");
        assert_eq!(body["error"], "Wrong email or password");
    }
}

#[tokio::test]
async fn login_accepts_any_alias_of_the_registered_mailbox() {
    let app = spawn_app().await;
    register_user(&app, "new.user@gmail.com", "nu").await;

    let response = login_user(&app, "newuser+anything@gmail.com", "password123").await;
    assert_eq!(200, response.status().as_u16());
}

// --- Refresh ---

#[tokio::test]
async fn refresh_without_cookie_returns_401_and_never_touches_the_store() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(&format!("{}/api/auth/refresh", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("description").is_some());
    assert!(body.get("access").is_none());

    let entries = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM token_blacklist")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count blacklist entries");
    assert_eq!(entries, 0);
}

#[tokio::test]
async fn refresh_rotates_the_refresh_token() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    let login_response = login_user(&app, "john@example.com", "password123").await;
    let old_refresh = refresh_cookie_value(&login_response).expect("No refresh cookie");

    let response = reqwest::Client::new()
        .post(&format!("{}/api/auth/refresh", &app.address))
        .header("Cookie", format!("refresh-token={}", old_refresh))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let new_refresh = refresh_cookie_value(&response).expect("No rotated refresh cookie");
    assert_ne!(old_refresh, new_refresh, "refresh token must rotate");

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["username"], "john");
    assert!(body.get("access").is_some());
}

#[tokio::test]
async fn rotated_access_token_still_names_the_same_principal() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    let login_response = login_user(&app, "john@example.com", "password123").await;
    let refresh = refresh_cookie_value(&login_response).expect("No refresh cookie");

    let refresh_response = reqwest::Client::new()
        .post(&format!("{}/api/auth/refresh", &app.address))
        .header("Cookie", format!("refresh-token={}", refresh))
        .send()
        .await
        .expect("Failed to execute request.");
    let body: Value = refresh_response.json().await.expect("Failed to parse response");
    let access = body["access"].as_str().expect("No access token");

    // The rotated access token opens the same principal's profile.
    let profile_response = reqwest::Client::new()
        .get(&format!("{}/api/auth/profile", &app.address))
        .header("Authorization", format!("Bearer {}", access))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, profile_response.status().as_u16());
    let profile: Value = profile_response.json().await.expect("Failed to parse response");
    assert_eq!(profile["username"], "john");
    assert_eq!(profile["email"], "john@example.com");
}

#[tokio::test]
async fn superseded_refresh_token_stays_valid_until_revoked() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    let login_response = login_user(&app, "john@example.com", "password123").await;
    let old_refresh = refresh_cookie_value(&login_response).expect("No refresh cookie");

    let client = reqwest::Client::new();
    client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .header("Cookie", format!("refresh-token={}", old_refresh))
        .send()
        .await
        .expect("Failed to execute request.");

    // Rotation does not blacklist the superseded token; only logout does.
    let response = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .header("Cookie", format!("refresh-token={}", old_refresh))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn refresh_with_garbage_cookie_returns_401() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(&format!("{}/api/auth/refresh", &app.address))
        .header("Cookie", "refresh-token=definitely.not.a-jwt")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

// --- Logout ---

#[tokio::test]
async fn logout_revokes_and_clears_the_cookie() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    let login_response = login_user(&app, "john@example.com", "password123").await;
    let refresh = refresh_cookie_value(&login_response).expect("No refresh cookie");

    let client = reqwest::Client::new();
    let response = client
        .post(&format!("{}/api/auth/logout", &app.address))
        .header("Cookie", format!("refresh-token={}", refresh))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(204, response.status().as_u16());
    let cleared = response
        .cookies()
        .find(|c| c.name() == "refresh-token")
        .expect("No clearing cookie");
    assert!(cleared.value().is_empty());

    // The pre-logout refresh token is dead, and stays dead.
    for _ in 0..2 {
        let response = client
            .post(&format!("{}/api/auth/refresh", &app.address))
            .header("Cookie", format!("refresh-token={}", refresh))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(401, response.status().as_u16());
    }
}

#[tokio::test]
async fn logout_without_cookie_returns_401() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(&format!("{}/api/auth/logout", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn logout_with_garbage_cookie_returns_401_but_still_clears_it() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(&format!("{}/api/auth/logout", &app.address))
        .header("Cookie", "refresh-token=garbage")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let cleared = response
        .cookies()
        .find(|c| c.name() == "refresh-token")
        .expect("Clearing must be best-effort even on failure");
    assert!(cleared.value().is_empty());
}

#[tokio::test]
async fn logout_does_not_kill_other_sessions_of_the_same_principal() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    let first = login_user(&app, "john@example.com", "password123").await;
    let second = login_user(&app, "john@example.com", "password123").await;
    let first_refresh = refresh_cookie_value(&first).expect("No refresh cookie");
    let second_refresh = refresh_cookie_value(&second).expect("No refresh cookie");

    let client = reqwest::Client::new();
    client
        .post(&format!("{}/api/auth/logout", &app.address))
        .header("Cookie", format!("refresh-token={}", first_refresh))
        .send()
        .await
        .expect("Failed to execute request.");

    // Revocation is per-jti, not per-principal.
    let response = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .header("Cookie", format!("refresh-token={}", second_refresh))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
}

// --- Protected profile ---

#[tokio::test]
async fn profile_requires_an_access_token() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/api/auth/profile", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());

    let response = reqwest::Client::new()
        .get(&format!("{}/api/auth/profile", &app.address))
        .header("Authorization", "Bearer invalid.token.here")
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn profile_returns_the_default_image_for_a_new_user() {
    let app = spawn_app().await;

    let register_response = register_user(&app, "john@example.com", "john").await;
    let body: Value = register_response.json().await.expect("Failed to parse response");
    let access = body["access"].as_str().expect("No access token");

    let response = reqwest::Client::new()
        .get(&format!("{}/api/auth/profile", &app.address))
        .header("Authorization", format!("Bearer {}", access))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let profile: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(profile["image"], "/media/default.jpg");
}

// --- User store ---

#[tokio::test]
async fn deleting_a_user_cascades_to_its_profile() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    let user = users::find_by_email(&app.db_pool, "john@example.com")
        .await
        .expect("Lookup failed")
        .expect("User not found");

    assert!(users::find_profile(&app.db_pool, &user.id)
        .await
        .expect("Profile lookup failed")
        .is_some());

    let deleted = users::delete_user(&app.db_pool, &user.id)
        .await
        .expect("Delete failed");
    assert!(deleted);

    assert!(users::find_by_id(&app.db_pool, &user.id)
        .await
        .expect("Lookup failed")
        .is_none());
    assert!(users::find_profile(&app.db_pool, &user.id)
        .await
        .expect("Profile lookup failed")
        .is_none());
}

#[tokio::test]
async fn username_can_be_updated() {
    let app = spawn_app().await;
    register_user(&app, "john@example.com", "john").await;

    let user = users::find_by_email(&app.db_pool, "john@example.com")
        .await
        .expect("Lookup failed")
        .expect("User not found");

    users::update_username(&app.db_pool, &user.id, "johnny")
        .await
        .expect("Update failed");

    let updated = users::find_by_id(&app.db_pool, &user.id)
        .await
        .expect("Lookup failed")
        .expect("User not found");
    assert_eq!(updated.username, "johnny");
}

#[tokio::test]
async fn concurrent_duplicate_registration_is_caught_by_the_constraint() {
    let app = spawn_app().await;

    users::create_user(&app.db_pool, "dup@example.com", "dup", "hash")
        .await
        .expect("First create failed");

    // Bypassing the gateway's advisory pre-checks, the store still rejects.
    let result = users::create_user(&app.db_pool, "dup@example.com", "dup2", "hash").await;
    match result {
        Err(auth_server::error::AppError::Registration(errors)) => {
            assert!(errors.has_conflict());
        }
        other => panic!("expected a registration conflict, got {:?}", other.map(|u| u.id)),
    }
}

// --- Blacklist store ---

#[tokio::test]
async fn sweep_removes_only_expired_entries() {
    let app = spawn_app().await;
    let now = Utc::now();

    revoke_jti(&app.db_pool, "dead-jti", now - Duration::hours(1))
        .await
        .expect("Failed to revoke");
    revoke_jti(&app.db_pool, "live-jti", now + Duration::hours(1))
        .await
        .expect("Failed to revoke");

    let removed = sweep_expired(&app.db_pool, now).await.expect("Sweep failed");
    assert_eq!(removed, 1);

    assert!(!is_revoked(&app.db_pool, "dead-jti").await.expect("Lookup failed"));
    assert!(is_revoked(&app.db_pool, "live-jti").await.expect("Lookup failed"));
}

#[tokio::test]
async fn revoking_twice_is_a_no_op() {
    let app = spawn_app().await;
    let expires_at = Utc::now() + Duration::hours(1);

    revoke_jti(&app.db_pool, "some-jti", expires_at)
        .await
        .expect("Failed to revoke");
    revoke_jti(&app.db_pool, "some-jti", expires_at)
        .await
        .expect("Second revoke must not error");

    assert!(is_revoked(&app.db_pool, "some-jti").await.expect("Lookup failed"));
}
