use argon2::Argon2;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

const ARGON2_PREFIX: &str = "argon2id$";

/// Hash a password with Argon2id, salted with the owning account's id.
///
/// The account id is the only per-account salt, so the hash is deterministic
/// for a given `(password, account_id)` pair and login can recompute it.
pub fn hash_password(password: &str, account_id: Uuid) -> Result<String, AppError> {
    let argon2 = Argon2::default();
    let mut hash = [0u8; 32];

    argon2
        .hash_password_into(password.as_bytes(), account_id.as_bytes(), &mut hash)
        .map_err(|e| AppError::Crypto(format!("Password hashing failed: {}", e)))?;

    Ok(format!("{}{}", ARGON2_PREFIX, hex::encode(hash)))
}

/// Upper-case hex SHA-256 of `password + account_id`, the format of records
/// created before the Argon2id upgrade.
pub fn legacy_hash(password: &str, account_id: Uuid) -> String {
    let digest = Sha256::digest(format!("{}{}", password, account_id).as_bytes());
    hex::encode_upper(digest)
}

/// Recompute the hash for `account_id` and compare it with `stored_hash`.
///
/// Anything that is neither an Argon2id record nor a legacy SHA-256 record
/// (e.g. the empty hash of the reserved accounts) never verifies.
pub fn verify_password(password: &str, account_id: Uuid, stored_hash: &str) -> Result<bool, AppError> {
    if stored_hash.starts_with(ARGON2_PREFIX) {
        return Ok(hash_password(password, account_id)? == stored_hash);
    }

    if is_legacy_hash(stored_hash) {
        return Ok(legacy_hash(password, account_id) == stored_hash);
    }

    Ok(false)
}

fn is_legacy_hash(stored_hash: &str) -> bool {
    stored_hash.len() == 64 && stored_hash.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verify() {
        let id = Uuid::new_v4();
        let hash = hash_password("test_password_123", id).unwrap();

        assert!(hash.starts_with(ARGON2_PREFIX));
        assert!(verify_password("test_password_123", id, &hash).unwrap());
        assert!(!verify_password("wrong_password", id, &hash).unwrap());
    }

    #[test]
    fn test_hash_is_bound_to_account_id() {
        let hash = hash_password("same_password", Uuid::new_v4()).unwrap();
        assert!(!verify_password("same_password", Uuid::new_v4(), &hash).unwrap());
    }

    #[test]
    fn test_legacy_hash_still_verifies() {
        let id = Uuid::new_v4();
        let stored = legacy_hash("hunter2", id);

        assert_eq!(stored.len(), 64);
        assert_eq!(stored, stored.to_uppercase());
        assert!(verify_password("hunter2", id, &stored).unwrap());
        assert!(!verify_password("hunter3", id, &stored).unwrap());
    }

    #[test]
    fn test_unusable_hash_never_verifies() {
        assert!(!verify_password("", Uuid::nil(), "").unwrap());
        assert!(!verify_password("anything", Uuid::nil(), "not-a-hash").unwrap());
    }
}
