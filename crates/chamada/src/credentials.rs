//! Session token and the identity derived from it.
//!
//! Login stores the bearer token under [`TOKEN_KEY`] and the student id from
//! its claims under [`STUDENT_ID_KEY`]; the scanner only ever reads both.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Storage key of the bearer token.
pub const TOKEN_KEY: &str = "@token";

/// Storage key of the student id.
pub const STUDENT_ID_KEY: &str = "@id_aluno";

/// Claims carried by the session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Student id, as a number or numeric string.
    pub id: Value,
    /// Full name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nome: Option<String>,
    /// CPF (taxpayer number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    /// Enrollment number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ra: Option<String>,
    /// Expiry, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Decode the payload segment of a JWT. The signature is not checked;
    /// the server does that on every request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] if the token is not three dot-separated
    /// segments or the payload is not base64url-encoded JSON claims.
    pub fn decode(token: &str) -> Result<Self> {
        let mut segments = token.trim().split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(Error::InvalidToken(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::InvalidToken(format!("payload is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidToken(format!("payload is not valid claims: {e}")))
    }

    /// Student id as the endpoint expects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] if `id` is not an integer.
    pub fn student_id(&self) -> Result<i64> {
        let id = match &self.id {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        id.ok_or_else(|| Error::InvalidToken(format!("student id is not an integer: {}", self.id)))
    }
}

/// Parse a stored student id.
///
/// # Errors
///
/// Returns [`Error::InvalidToken`] if the stored value is not an integer.
pub fn parse_student_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidToken(format!("stored student id is not an integer: {raw}")))
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_claims() {
        let token = encode_test_token(&json!({
            "id": 42, "nome": "Ana", "cpf": "000.000.000-00", "ra": "2024001"
        }));
        let claims = TokenClaims::decode(&token).unwrap();

        assert_eq!(claims.student_id().unwrap(), 42);
        assert_eq!(claims.nome.as_deref(), Some("Ana"));
        assert_eq!(claims.ra.as_deref(), Some("2024001"));
        assert!(claims.exp.is_none());
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let token = encode_test_token(&json!({"id": "7"}));
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1].push_str("==");
        let padded = parts.join(".");

        assert_eq!(TokenClaims::decode(&padded).unwrap().student_id().unwrap(), 7);
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        assert!(matches!(
            TokenClaims::decode("abc.def"),
            Err(Error::InvalidToken(_))
        ));
        assert!(matches!(
            TokenClaims::decode("a.b.c.d"),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage_payload() {
        assert!(TokenClaims::decode("x.!!!.y").is_err());
        let not_claims = format!("x.{}.y", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(TokenClaims::decode(&not_claims).is_err());
    }

    #[test]
    fn test_non_integer_student_id() {
        let token = encode_test_token(&json!({"id": "abc"}));
        let claims = TokenClaims::decode(&token).unwrap();
        assert!(claims.student_id().is_err());
    }

    #[test]
    fn test_parse_student_id() {
        assert_eq!(parse_student_id(" 42 ").unwrap(), 42);
        assert!(parse_student_id("forty-two").is_err());
    }
}
