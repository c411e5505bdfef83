// Shared-secret authentication for the internal trigger endpoint

use crate::errors::ValidationError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Compare a presented secret with the configured one in constant time
///
/// Both values are MACed under the configured secret so the comparison runs
/// over equal-length digests regardless of the presented length.
pub fn verify_trigger_secret(presented: &str, expected: &str) -> Result<bool, ValidationError> {
    if expected.is_empty() {
        return Err(ValidationError::InvalidFieldValue {
            field: "scheduler.trigger_secret".to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    let mut reference = keyed_mac(expected)?;
    reference.update(expected.as_bytes());
    let expected_digest = reference.finalize().into_bytes();

    let mut mac = keyed_mac(expected)?;
    mac.update(presented.as_bytes());
    Ok(mac.verify_slice(&expected_digest).is_ok())
}

fn keyed_mac(secret: &str) -> Result<HmacSha256, ValidationError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| ValidationError::InvalidFieldValue {
        field: "scheduler.trigger_secret".to_string(),
        reason: format!("Invalid secret key: {}", e),
    })
}

/// Authorize a trigger request given its raw `Authorization` header
pub fn authorize_trigger(
    authorization: Option<&str>,
    expected: &str,
) -> Result<bool, ValidationError> {
    match authorization.and_then(bearer_token) {
        Some(token) => verify_trigger_secret(token, expected),
        None => Ok(false),
    }
}
