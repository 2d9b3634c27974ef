//! CSRF protection helpers.
//!
//! Each session carries an anti-forgery token that must accompany every
//! mutating request. Comparison is constant-time.

use rand::RngCore;

/// Generate a new 32-byte hex-encoded CSRF token
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate a submitted token against the session's token.
/// Constant-time over the stored token length.
pub fn validate_token(expected: &str, submitted: &str) -> bool {
    if expected.is_empty() || submitted.is_empty() {
        return false;
    }
    if expected.len() != submitted.len() {
        return false;
    }
    expected
        .bytes()
        .zip(submitted.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_matching_token() {
        let token = generate_token();
        assert!(validate_token(&token, &token));
    }

    #[test]
    fn test_validate_rejects_mismatch() {
        let token = generate_token();
        let other = generate_token();
        assert!(!validate_token(&token, &other));
    }

    #[test]
    fn test_validate_rejects_empty_and_truncated() {
        let token = generate_token();
        assert!(!validate_token(&token, ""));
        assert!(!validate_token("", &token));
        assert!(!validate_token(&token, &token[..32]));
    }
}
