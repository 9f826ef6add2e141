use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;

use crate::error::AppError;

const PRIVATE_KEY_FILE: &str = "token.privkey";
const PUBLIC_KEY_FILE: &str = "token.pubkey";

/// The process-wide token signing keypair.
pub struct TokenKeys {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl TokenKeys {
    /// Load the keypair from `keys_dir`, generating and saving a fresh one
    /// the first time.
    pub fn setup(keys_dir: &str) -> Result<Self, AppError> {
        let private_path = Path::new(keys_dir).join(PRIVATE_KEY_FILE);
        let public_path = Path::new(keys_dir).join(PUBLIC_KEY_FILE);

        if private_path.exists() && public_path.exists() {
            tracing::info!("Loading existing token keys from {}", keys_dir);
            return Self::load(&private_path, &public_path);
        }

        tracing::info!("Generating new token keypair in {}", keys_dir);
        fs::create_dir_all(keys_dir)
            .map_err(|e| AppError::Crypto(format!("Failed to create keys directory: {}", e)))?;

        let keys = Self::generate();
        save_key(keys.signing_key.as_bytes(), &private_path)?;
        save_key(keys.verifying_key.as_bytes(), &public_path)?;

        tracing::info!("Token keypair generated and saved");
        Ok(keys)
    }

    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        TokenKeys {
            signing_key,
            verifying_key,
        }
    }

    fn load(private_path: &Path, public_path: &Path) -> Result<Self, AppError> {
        let private_bytes = read_key(private_path)?;
        let public_bytes = read_key(public_path)?;

        let signing_key = SigningKey::from_bytes(&private_bytes);
        let verifying_key = VerifyingKey::from_bytes(&public_bytes)
            .map_err(|e| AppError::Crypto(format!("Invalid public key: {}", e)))?;

        if signing_key.verifying_key() != verifying_key {
            return Err(AppError::Crypto(
                "Public key does not belong to the private key".to_string(),
            ));
        }

        Ok(TokenKeys {
            signing_key,
            verifying_key,
        })
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(data).to_bytes().to_vec()
    }

    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.verifying_key.verify(data, &signature).is_ok()
    }

    pub fn public_key_base64(&self) -> String {
        B64.encode(self.verifying_key.as_bytes())
    }
}

/// Keys are stored as a single base64 line of the raw 32 key bytes.
fn read_key(path: &Path) -> Result<[u8; 32], AppError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| AppError::Crypto(format!("Failed to read {}: {}", path.display(), e)))?;
    let bytes = B64
        .decode(contents.trim())
        .map_err(|e| AppError::Crypto(format!("Failed to decode {}: {}", path.display(), e)))?;

    bytes
        .try_into()
        .map_err(|_| AppError::Crypto(format!("Key in {} must be 32 bytes", path.display())))
}

fn save_key(bytes: &[u8; 32], path: &Path) -> Result<(), AppError> {
    fs::write(path, format!("{}\n", B64.encode(bytes)))
        .map_err(|e| AppError::Crypto(format!("Failed to write key to {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_generates_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let keys_dir = dir.path().to_str().unwrap();

        let first = TokenKeys::setup(keys_dir).unwrap();
        assert!(dir.path().join(PRIVATE_KEY_FILE).exists());
        assert!(dir.path().join(PUBLIC_KEY_FILE).exists());

        let second = TokenKeys::setup(keys_dir).unwrap();
        assert_eq!(first.public_key_base64(), second.public_key_base64());

        let signature = first.sign(b"payload");
        assert!(second.verify(b"payload", &signature));
    }

    #[test]
    fn test_mismatched_keypair_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let keys_dir = dir.path().to_str().unwrap();
        TokenKeys::setup(keys_dir).unwrap();

        let other = TokenKeys::generate();
        save_key(other.verifying_key.as_bytes(), &dir.path().join(PUBLIC_KEY_FILE)).unwrap();

        assert!(matches!(TokenKeys::setup(keys_dir), Err(AppError::Crypto(_))));
    }

    #[test]
    fn test_verify_rejects_garbage_signature() {
        let keys = TokenKeys::generate();
        assert!(!keys.verify(b"payload", &[0u8; 10]));
        assert!(!keys.verify(b"payload", &[0u8; 64]));
    }
}
