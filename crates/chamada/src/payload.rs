//! QR payload parsing.
//!
//! The instructor's screen encodes `{ id, hora_post, lat, long }` as JSON.
//! Parsing either yields a complete [`ScanPayload`] or a typed error; a
//! partially filled payload never leaves this module.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Identifier of the roll call, echoed back to the server untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallId {
    /// Numeric id (the usual case).
    Number(serde_json::Number),
    /// Text id.
    Text(String),
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A validated QR payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPayload {
    /// Roll call id (`id`).
    pub call_id: CallId,
    /// Timestamp produced by the server when the code was generated (`hora_post`).
    pub server_timestamp: String,
    /// Instructor latitude (`lat`).
    pub instructor_latitude: f64,
    /// Instructor longitude (`long`).
    pub instructor_longitude: f64,
}

impl ScanPayload {
    /// Parse and validate raw QR text.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedPayload`] if the text is not a JSON object or a
    ///   field has the wrong type.
    /// - [`Error::IncompletePayload`] if a required field is absent or null.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw.trim()).map_err(|e| Error::malformed(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(Error::malformed("expected a JSON object"));
        };

        let call_id = match required(&fields, "id")? {
            Value::Number(n) => CallId::Number(n.clone()),
            Value::String(s) if s.trim().is_empty() => return Err(Error::incomplete("id")),
            Value::String(s) => CallId::Text(s.clone()),
            _ => return Err(Error::malformed("'id' must be a number or a string")),
        };

        let server_timestamp = match required(&fields, "hora_post")? {
            Value::String(s) => s.clone(),
            _ => return Err(Error::malformed("'hora_post' must be a string")),
        };

        Ok(Self {
            call_id,
            server_timestamp,
            instructor_latitude: coordinate(&fields, "lat")?,
            instructor_longitude: coordinate(&fields, "long")?,
        })
    }
}

fn required<'a>(fields: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value> {
    match fields.get(name) {
        None | Some(Value::Null) => Err(Error::incomplete(name)),
        Some(value) => Ok(value),
    }
}

fn coordinate(fields: &Map<String, Value>, name: &'static str) -> Result<f64> {
    required(fields, name)?
        .as_f64()
        .ok_or_else(|| Error::malformed(format!("'{name}' must be a number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_payload() {
        let payload = ScanPayload::parse(r#"{"id":7,"hora_post":"T","lat":1.0,"long":2.0}"#).unwrap();
        assert_eq!(payload.call_id.to_string(), "7");
        assert_eq!(payload.server_timestamp, "T");
        assert!((payload.instructor_latitude - 1.0).abs() < f64::EPSILON);
        assert!((payload.instructor_longitude - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_text_call_id() {
        let payload =
            ScanPayload::parse(r#"{"id":"abc","hora_post":"T","lat":-15.6,"long":-56.1}"#).unwrap();
        assert_eq!(payload.call_id, CallId::Text("abc".to_string()));
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        assert!(ScanPayload::parse("  {\"id\":1,\"hora_post\":\"T\",\"lat\":0,\"long\":0}\n").is_ok());
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = ScanPayload::parse("hello professor").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_json_array_is_malformed() {
        let err = ScanPayload::parse("[1,2,3]").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_missing_lat_is_incomplete() {
        let err = ScanPayload::parse(r#"{"id":7,"hora_post":"T","long":2.0}"#).unwrap_err();
        assert!(matches!(err, Error::IncompletePayload { field: "lat" }));
    }

    #[test]
    fn test_null_field_is_incomplete() {
        let err = ScanPayload::parse(r#"{"id":7,"hora_post":null,"lat":1,"long":2}"#).unwrap_err();
        assert!(matches!(err, Error::IncompletePayload { field: "hora_post" }));
    }

    #[test]
    fn test_empty_id_is_incomplete() {
        let err = ScanPayload::parse(r#"{"id":"  ","hora_post":"T","lat":1,"long":2}"#).unwrap_err();
        assert!(matches!(err, Error::IncompletePayload { field: "id" }));
    }

    #[test]
    fn test_text_coordinate_is_malformed() {
        let err = ScanPayload::parse(r#"{"id":7,"hora_post":"T","lat":"north","long":2}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_call_id_serializes_verbatim() {
        let number = ScanPayload::parse(r#"{"id":7,"hora_post":"T","lat":1,"long":2}"#).unwrap();
        assert_eq!(serde_json::to_string(&number.call_id).unwrap(), "7");

        let text = ScanPayload::parse(r#"{"id":"7a","hora_post":"T","lat":1,"long":2}"#).unwrap();
        assert_eq!(serde_json::to_string(&text.call_id).unwrap(), "\"7a\"");
    }
}
