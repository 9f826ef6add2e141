use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::crypto::TokenKeys;
use crate::error::{AppError, AppResult};
use crate::token::claims::{AuthorizationClaims, Claims};
use crate::token::signed::{canonical_bytes, SignedToken};

/// Tokens issued slightly in the future are tolerated up to this much clock skew.
const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Issues and checks signed tokens with the process keypair.
pub struct TokenAuthority {
    keys: TokenKeys,
    max_age: Duration,
}

impl TokenAuthority {
    pub fn new(keys: TokenKeys, max_age: Duration) -> Self {
        TokenAuthority { keys, max_age }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let max_age = config.token_max_age()?;
        let keys = TokenKeys::setup(&config.keys_dir)?;
        Ok(Self::new(keys, max_age))
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub fn issue<T: Claims>(&self, payload: &T) -> AppResult<String> {
        let signature = self.keys.sign(&canonical_bytes(payload)?);
        SignedToken { payload, signature }.encode()
    }

    pub fn issue_authorization(&self, user_id: Uuid) -> AppResult<String> {
        self.issue(&AuthorizationClaims::new(user_id))
    }

    /// Check the signature of any well-formed token. Never fails: malformed
    /// input is simply not valid.
    pub fn verify(&self, token: &str) -> bool {
        let Ok(signed) = SignedToken::<Value>::parse(token) else {
            return false;
        };
        match signed.signed_bytes() {
            Ok(bytes) => self.keys.verify(&bytes, &signed.signature),
            Err(_) => false,
        }
    }

    /// Verify, decode as `T` and check freshness.
    pub fn open<T: Claims>(&self, token: &str) -> AppResult<T> {
        self.open_at(token, Utc::now())
    }

    fn open_at<T: Claims>(&self, token: &str, now: DateTime<Utc>) -> AppResult<T> {
        if !self.verify(token) {
            return Err(AppError::unauthorized("Invalid token signature"));
        }

        let claims = SignedToken::<T>::parse(token)?.payload;
        let issued_at = claims.issued_at();

        if issued_at > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            return Err(AppError::unauthorized("Token issued in the future"));
        }
        if now - issued_at > self.max_age {
            return Err(AppError::unauthorized("Token expired"));
        }

        Ok(claims)
    }

    pub fn authorize(&self, token: &str) -> AppResult<AuthorizationClaims> {
        self.open(token)
    }

    /// Returns the verified claims, or calls `on_unauthorized` and returns
    /// `None` when the token is invalid, malformed or stale.
    pub fn authorize_or_else<F>(&self, token: &str, on_unauthorized: F) -> Option<AuthorizationClaims>
    where
        F: FnOnce(),
    {
        match self.authorize(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!("Rejected authorization token: {}", e);
                on_unauthorized();
                None
            }
        }
    }
}
