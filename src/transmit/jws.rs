//! Compact JWS assembly for security event tokens.

use crate::core::traits::{SignError, Signer};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use std::fmt;

/// Protected header for every SET.
pub const SET_HEADER: &str = r#"{"alg":"RS256","typ":"secevent+jwt"}"#;

/// A signed token split into its base64url segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    pub header: String,
    pub payload: String,
    pub signature: String,
}

impl Jws {
    /// Encodes `payload`, signs `header.payload` and encodes the signature.
    ///
    /// String payloads are encoded as-is; anything else is serialized to
    /// JSON first.
    pub fn build(payload: &Value, signer: &impl Signer) -> Result<Self, SignError> {
        let header = encode_segment(SET_HEADER.as_bytes());
        let payload = match payload {
            Value::String(raw) => encode_segment(raw.as_bytes()),
            other => encode_segment(other.to_string().as_bytes()),
        };
        let signing_input = format!("{header}.{payload}");
        let signature = encode_segment(&signer.sign(signing_input.as_bytes())?);
        Ok(Self {
            header,
            payload,
            signature,
        })
    }
}

impl fmt::Display for Jws {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.header, self.payload, self.signature)
    }
}

fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}
