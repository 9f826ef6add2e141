use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unable to find {kind} with id {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Token decoding error: {0}")]
    Decoding(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        AppError::NotFound { kind, id }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        AppError::Unauthorized(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(format!("Document serialization failed: {}", err))
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::Decoding(format!("Invalid base64: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_carries_id() {
        let id = Uuid::new_v4();
        let err = AppError::not_found("channel", id);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), format!("Unable to find channel with id {}", id));
    }
}
