/// Password Hashing and Verification
///
/// One-way hashing with bcrypt. The rest of the system treats this as an
/// opaque pair of primitives: hash on registration, verify on login.
use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::AppError;

// bcrypt ignores input past 72 bytes; cap well below that instead of
// silently truncating.
const MAX_PASSWORD_LENGTH: usize = 64;

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if the password exceeds the length cap or hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Internal("Password exceeds length cap".to_string()));
    }

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Errors
/// Returns error if verification itself fails (a mismatch is `Ok(false)`)
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}
