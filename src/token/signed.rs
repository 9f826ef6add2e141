use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

/// Envelope format version. Bump when the payload canonicalization changes.
pub const TOKEN_VERSION: u8 = 1;

/// A payload together with the signature over its canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken<T> {
    pub payload: T,
    pub signature: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope<P> {
    version: u8,
    payload: P,
    signature: String,
}

impl<T: DeserializeOwned> SignedToken<T> {
    /// Decode a token string without checking its signature.
    pub fn parse(token: &str) -> AppResult<Self> {
        let bytes = B64.decode(token)?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Decoding(format!("Malformed token envelope: {}", e)))?;

        if envelope.version != TOKEN_VERSION {
            return Err(AppError::Decoding(format!(
                "Unsupported token version {}",
                envelope.version
            )));
        }

        let signature = B64.decode(&envelope.signature)?;

        Ok(SignedToken {
            payload: envelope.payload,
            signature,
        })
    }
}

impl<T: Serialize> SignedToken<T> {
    /// The exact bytes the signature covers.
    pub fn signed_bytes(&self) -> AppResult<Vec<u8>> {
        canonical_bytes(&self.payload)
    }

    pub fn encode(&self) -> AppResult<String> {
        let envelope = Envelope {
            version: TOKEN_VERSION,
            payload: &self.payload,
            signature: B64.encode(&self.signature),
        };
        let json = serde_json::to_vec(&envelope)
            .map_err(|e| AppError::Internal(format!("Token serialization failed: {}", e)))?;
        Ok(B64.encode(json))
    }
}

/// Compact JSON with object keys sorted at every level, so the bytes depend
/// only on the payload's value and never on struct field order.
pub fn canonical_bytes<T: Serialize>(payload: &T) -> AppResult<Vec<u8>> {
    let value = serde_json::to_value(payload)
        .map_err(|e| AppError::Internal(format!("Token payload serialization failed: {}", e)))?;
    serde_json::to_vec(&sort_keys(value))
        .map_err(|e| AppError::Internal(format!("Token payload serialization failed: {}", e)))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Forward {
        alpha: u32,
        beta: &'static str,
    }

    #[derive(Serialize)]
    struct Reversed {
        beta: &'static str,
        alpha: u32,
    }

    #[test]
    fn test_canonical_bytes_ignore_field_order() {
        let a = canonical_bytes(&Forward { alpha: 1, beta: "x" }).unwrap();
        let b = canonical_bytes(&Reversed { beta: "x", alpha: 1 }).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, br#"{"alpha":1,"beta":"x"}"#.to_vec());
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let bytes = canonical_bytes(&json!({"z": {"b": 1, "a": [ {"d": 0, "c": 0} ]}})).unwrap();
        assert_eq!(bytes, br#"{"z":{"a":[{"c":0,"d":0}],"b":1}}"#.to_vec());
    }

    #[test]
    fn test_parse_rejects_bad_base64() {
        let err = SignedToken::<Value>::parse("not base64!!").unwrap_err();
        assert!(matches!(err, AppError::Decoding(_)));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let token = B64.encode(br#"{"hello":"world"}"#);
        let err = SignedToken::<Value>::parse(&token).unwrap_err();
        assert!(matches!(err, AppError::Decoding(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_version() {
        let token = B64.encode(br#"{"version":9,"payload":{},"signature":""}"#);
        let err = SignedToken::<Value>::parse(&token).unwrap_err();
        assert!(matches!(err, AppError::Decoding(msg) if msg.contains("version")));
    }

    #[test]
    fn test_encode_parse_keeps_signature() {
        let token = SignedToken {
            payload: json!({"userId": "abc"}),
            signature: vec![1, 2, 3],
        };
        let parsed = SignedToken::<Value>::parse(&token.encode().unwrap()).unwrap();
        assert_eq!(parsed, token);
    }
}
