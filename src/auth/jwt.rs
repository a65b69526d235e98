/// JWT encoding and decoding
///
/// HS256 signing for both credential kinds. Decoding distinguishes an
/// expired-but-authentic token from a malformed one, so the token service
/// can keep the two failure kinds apart internally.
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, TokenError};

/// Generate a new access token for a user
///
/// # Errors
/// Returns error if token generation fails
pub fn generate_access_token(user_id: &Uuid, config: &JwtSettings) -> Result<String, AppError> {
    let claims = AccessClaims::new(*user_id, config.access_token_expiry, config.issuer.clone());

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Generate a new refresh token for a user, carrying the given jti.
///
/// # Errors
/// Returns error if token generation fails
pub fn generate_refresh_token(
    user_id: &Uuid,
    jti: &str,
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = RefreshClaims::new(
        *user_id,
        config.refresh_token_expiry,
        config.issuer.clone(),
        jti.to_string(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate and extract claims from an access token.
///
/// Access credentials are self-verifying: signature + expiry is the whole
/// check, no store lookup. Failure kinds are merged, a bearer of a bad
/// access token learns nothing beyond "invalid".
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<AccessClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("Access token validation error: {}", e);
        AppError::Internal("Invalid or expired token".to_string())
    })
}

/// Decode a refresh token, verifying signature, issuer and expiry.
///
/// The cryptographic check runs first and on its own; the revocation
/// lookup is the caller's concern, so malformed input never costs a store
/// round trip.
pub fn decode_refresh_token(token: &str, config: &JwtSettings) -> Result<RefreshClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token = generate_access_token(&user_id, &config).expect("Failed to generate token");
        let claims = validate_access_token(&token, &config).expect("Failed to validate token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn refresh_token_round_trip_keeps_jti() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token = generate_refresh_token(&user_id, "jti-123", &config)
            .expect("Failed to generate token");
        let claims = decode_refresh_token(&token, &config).expect("Failed to decode token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.jti, "jti-123");
    }

    #[test]
    fn garbage_is_malformed() {
        let config = get_test_config();
        let result = decode_refresh_token("invalid.token.here", &config);

        assert_eq!(result.unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn tampered_token_is_malformed() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token = generate_refresh_token(&user_id, "jti-123", &config)
            .expect("Failed to generate token");

        let tampered = format!("{}X", token);
        assert_eq!(
            decode_refresh_token(&tampered, &config).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn expired_token_is_expired_not_malformed() {
        let mut config = get_test_config();
        // Expire well past the decoder's leeway.
        config.refresh_token_expiry = -3600;

        let token = generate_refresh_token(&Uuid::new_v4(), "jti-123", &config)
            .expect("Failed to generate token");

        assert_eq!(
            decode_refresh_token(&token, &config).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn access_token_is_not_a_valid_refresh_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        // No jti claim, so the refresh decoder must reject it.
        let token = generate_access_token(&user_id, &config).expect("Failed to generate token");
        assert_eq!(
            decode_refresh_token(&token, &config).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let mut config = get_test_config();
        let token = generate_refresh_token(&Uuid::new_v4(), "jti-123", &config)
            .expect("Failed to generate token");

        config.issuer = "wrong-issuer".to_string();
        assert!(decode_refresh_token(&token, &config).is_err());
    }
}
