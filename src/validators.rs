/// Identity input validators.
/// Features:
/// 1. Email canonicalization: one canonical form per real-world mailbox
/// 2. Provider-aware folding: gmail ignores dots and plus-suffixes
/// 3. DoS protection: input length limits
/// 4. Username validation: bounded, printable display handles
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 3; // a@b
const MAX_USERNAME_LENGTH: usize = 20;

/// The one provider whose registrar documents dot/plus folding rules.
const FOLDING_DOMAIN: &str = "gmail.com";

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();
}

/// Canonicalizes a raw email address into the unique identity key used for
/// account lookup and uniqueness checks.
///
/// Pipeline: trim, structural checks (exactly one `@`, local part must not
/// begin with `+`), format check, lowercase the domain, then provider
/// folding for domains whose registrar ignores dots and plus-suffixes.
/// Two raw inputs denoting the same mailbox under the provider's rules come
/// out identical; the function is idempotent on its own output.
pub fn canonicalize_email(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email", MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    let mut parts = trimmed.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err(ValidationError::InvalidFormat("email")),
    };

    // An alias suffix with no mailbox in front of it is rejected outright,
    // before any folding could empty the local part.
    if local.starts_with('+') {
        return Err(ValidationError::InvalidFormat("email"));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    // Standard normalization: the domain is case-insensitive, the local
    // part is left as submitted.
    let domain = domain.to_lowercase();

    let local = if domain == FOLDING_DOMAIN {
        fold_provider_local(local)?
    } else {
        local.to_string()
    };

    Ok(format!("{}@{}", local, domain))
}

/// Applies the folding rules of a dot/plus-insensitive provider: every `.`
/// is removed and the local part is truncated at the first `+`.
fn fold_provider_local(local: &str) -> Result<String, ValidationError> {
    let without_dots: String = local.chars().filter(|c| *c != '.').collect();
    let folded = without_dots.split('+').next().unwrap_or("");

    if folded.is_empty() {
        return Err(ValidationError::InvalidFormat("email"));
    }

    Ok(folded.to_string())
}

/// Validates a display handle: trimmed, non-empty, bounded, printable.
pub fn validate_username(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username"));
    }

    if trimmed.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username", MAX_USERNAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat("username"));
    }

    Ok(trimmed.to_string())
}
