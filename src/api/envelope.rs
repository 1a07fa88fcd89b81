//! Response envelope decoding.
//!
//! Every resource call answers with either `{"response": <payload>}` or
//! `{"error": {...}}`. The payload is handed back as raw bytes so callers
//! pick their own schema.

use serde::Deserialize;
use serde_json::value::RawValue;

use super::error::{ErrorCode, RemoteError};

/// A decoded response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// The raw JSON of the `response` field (`null` when absent).
    Success(Vec<u8>),
    /// The provider returned an error object.
    Failure(RemoteError),
}

#[derive(Deserialize)]
struct WireEnvelope<'a> {
    #[serde(borrow, default)]
    response: Option<&'a RawValue>,
    #[serde(default)]
    error: Option<RemoteError>,
}

/// Splits a response body into payload or provider error.
///
/// An error object whose code is 0 counts as absent.
///
/// # Errors
///
/// Returns the JSON error if `body` is not an envelope object.
pub fn decode_envelope(body: &[u8]) -> Result<Envelope, serde_json::Error> {
    let wire: WireEnvelope<'_> = serde_json::from_slice(body)?;
    if let Some(error) = wire.error
        && error.code != ErrorCode::EMPTY
    {
        return Ok(Envelope::Failure(error));
    }
    let payload = wire.response.map_or("null", RawValue::get);
    Ok(Envelope::Success(payload.as_bytes().to_vec()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_success_payload_is_passed_through_raw() {
        let body = br#"{"response": {"count": 2, "items": [1, 2]}}"#;
        let Envelope::Success(payload) = decode_envelope(body).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(payload, br#"{"count": 2, "items": [1, 2]}"#);
    }

    #[test]
    fn test_error_envelope() {
        let body = br#"{"error": {"error_code": 6, "error_msg": "Too many requests per second"}}"#;
        let Envelope::Failure(error) = decode_envelope(body).unwrap() else {
            panic!("expected failure");
        };
        assert_eq!(error.code, ErrorCode::RATE_LIMIT_EXCEEDED);
    }

    #[test]
    fn test_zero_error_code_counts_as_absent() {
        let body = br#"{"response": 1, "error": {"error_code": 0}}"#;
        assert_eq!(
            decode_envelope(body).unwrap(),
            Envelope::Success(b"1".to_vec())
        );
    }

    #[test]
    fn test_missing_response_is_null() {
        assert_eq!(
            decode_envelope(b"{}").unwrap(),
            Envelope::Success(b"null".to_vec())
        );
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        assert!(decode_envelope(b"<html>").is_err());
        assert!(decode_envelope(b"[1,2]").is_err());
    }
}
