pub mod keys;
pub mod password;

pub use keys::TokenKeys;
pub use password::{hash_password, legacy_hash, verify_password};
