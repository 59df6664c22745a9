//! Argon2id password hashing for event passwords.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$...`), which is also how the
//! startup migration tells a hashed value apart from a legacy plaintext one.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::utils::error::AppError;

const ARGON2_PREFIX: &str = "$argon2";

/// How a stored `password_hash` value looks to the migration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredPassword {
    /// No password gate.
    Blank,
    Hashed,
    /// Carries the Argon2 prefix but is not a complete PHC string.
    Malformed,
    Plaintext,
}

pub fn classify(stored: &str) -> StoredPassword {
    if stored.trim().is_empty() {
        StoredPassword::Blank
    } else if !stored.starts_with(ARGON2_PREFIX) {
        StoredPassword::Plaintext
    } else if parse_hash(stored).is_some() {
        StoredPassword::Hashed
    } else {
        StoredPassword::Malformed
    }
}

/// Parses a PHC string, requiring both a salt and a hash output.
fn parse_hash(stored: &str) -> Option<PasswordHash<'_>> {
    PasswordHash::new(stored)
        .ok()
        .filter(|parsed| parsed.salt.is_some() && parsed.hash.is_some())
}

pub fn hash_password(raw: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalServerError(format!("password hashing failed: {e}")))
}

/// Checks `raw` against a stored PHC hash. The comparison is constant-time.
pub fn verify_password(raw: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = parse_hash(stored_hash).ok_or_else(|| {
        AppError::InternalServerError("stored password hash is malformed".to_string())
    })?;

    match Argon2::default().verify_password(raw.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::InternalServerError(format!(
            "password verification failed: {e}"
        ))),
    }
}

/// Runs [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(raw: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&raw))
        .await
        .map_err(|e| AppError::InternalServerError(format!("hashing task failed: {e}")))?
}

/// Runs [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(raw: String, stored_hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&raw, &stored_hash))
        .await
        .map_err(|e| AppError::InternalServerError(format!("verification task failed: {e}")))?
}

/// Treats a missing or whitespace-only password as "not supplied".
pub fn supplied(raw: Option<&str>) -> Option<&str> {
    raw.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_salted_and_verifiable() {
        let first = hash_password("secret").unwrap();
        let second = hash_password("secret").unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
        assert!(verify_password("secret", &first).unwrap());
        assert!(verify_password("secret", &second).unwrap());
    }

    #[test]
    fn test_near_misses_do_not_verify() {
        let hash = hash_password("secret").unwrap();

        for attempt in ["wrong", "Secret", "SECRET", " secret", "secret ", ""] {
            assert!(
                !verify_password(attempt, &hash).unwrap(),
                "'{}' should not verify",
                attempt
            );
        }
    }

    #[test]
    fn test_classify() {
        let hash = hash_password("pw").unwrap();

        assert_eq!(classify(&hash), StoredPassword::Hashed);
        assert_eq!(classify("hunter2"), StoredPassword::Plaintext);
        assert_eq!(classify("   "), StoredPassword::Blank);
        assert_eq!(classify("$argon2id$garbage"), StoredPassword::Malformed);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(verify_password("pw", "$argon2id$garbage").is_err());
    }

    #[test]
    fn test_supplied_ignores_blank() {
        assert_eq!(supplied(None), None);
        assert_eq!(supplied(Some("  ")), None);
        assert_eq!(supplied(Some(" pw ")), Some(" pw "));
    }
}
