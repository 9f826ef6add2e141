use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod sealed {
    pub trait Sealed {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Authorization,
    EmailVerification,
    Payment,
}

/// A payload that can travel inside a signed token.
///
/// The set of payloads is closed: every kind shares the same envelope and
/// is told apart by its shape, which is why each one rejects unknown fields.
pub trait Claims: Serialize + DeserializeOwned + sealed::Sealed {
    const KIND: TokenKind;

    fn issued_at(&self) -> DateTime<Utc>;
}

/// Proves that the bearer is the account `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthorizationClaims {
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

impl AuthorizationClaims {
    pub fn new(user_id: Uuid) -> Self {
        AuthorizationClaims {
            user_id,
            issued_at: Utc::now(),
        }
    }
}

/// Proves that `email` was confirmed by the owner of `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmailVerifyClaims {
    pub email: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

impl EmailVerifyClaims {
    pub fn new(email: impl Into<String>, user_id: Uuid) -> Self {
        EmailVerifyClaims {
            email: email.into(),
            user_id,
            issued_at: Utc::now(),
        }
    }
}

/// A payment request; `amount` is in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentClaims {
    pub merchant_id: Uuid,
    pub amount: u64,
    pub description: String,
    pub issued_at: DateTime<Utc>,
}

impl sealed::Sealed for AuthorizationClaims {}
impl sealed::Sealed for EmailVerifyClaims {}
impl sealed::Sealed for PaymentClaims {}

impl Claims for AuthorizationClaims {
    const KIND: TokenKind = TokenKind::Authorization;

    fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl Claims for EmailVerifyClaims {
    const KIND: TokenKind = TokenKind::EmailVerification;

    fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl Claims for PaymentClaims {
    const KIND: TokenKind = TokenKind::Payment;

    fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}
