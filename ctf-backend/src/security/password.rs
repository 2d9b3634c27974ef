//! Password and flag hashing using Argon2id.
//!
//! Flags are treated exactly like credentials: only a salted slow hash is
//! persisted, and verification is a one-way constant-time compare.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::ApiError;

/// Hash a secret (password or flag) using Argon2id.
/// Returns the PHC-formatted hash string including salt and parameters.
pub fn hash_secret(secret: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(ApiError::from)
}

/// Verify a candidate secret against a stored PHC hash.
/// A malformed stored hash verifies as false rather than erroring; the
/// submitter must not learn anything about stored-hash state.
pub fn verify_secret(candidate: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(h) => h,
        Err(e) => {
            log::error!("Stored hash is not valid PHC format: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("FLAG{correct}").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_secret("FLAG{correct}", &hash));
        assert!(!verify_secret("FLAG{wrong}", &hash));
    }

    #[test]
    fn test_different_salts() {
        let hash1 = hash_secret("hunter2secret").unwrap();
        let hash2 = hash_secret("hunter2secret").unwrap();
        assert_ne!(hash1, hash2);
        assert!(verify_secret("hunter2secret", &hash1));
        assert!(verify_secret("hunter2secret", &hash2));
    }

    #[test]
    fn test_invalid_stored_hash_verifies_false() {
        assert!(!verify_secret("anything", "not-a-phc-hash"));
    }
}
