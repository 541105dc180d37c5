//! Pluggable request/response codec capabilities.
//!
//! The framework core does not interpret bodies itself; handlers go through
//! the `Decoder`/`Encoder` selected on the request context. The default is
//! JSON on both sides.

use bytes::Bytes;

use crate::error::HttpError;

/// Decodes request payloads into a structured value.
pub trait Decoder: Send + Sync + 'static {
    /// The media type this decoder consumes.
    fn content_type(&self) -> &'static str;

    /// Decodes a complete payload. Failures surface as client errors.
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, HttpError>;
}

/// Encodes structured values into response payloads.
pub trait Encoder: Send + Sync + 'static {
    /// The media type this encoder produces.
    fn content_type(&self) -> &'static str;

    /// Encodes a value into body bytes.
    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, HttpError>;
}

/// The default codec: `application/json` both ways.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Decoder for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, HttpError> {
        serde_json::from_slice(bytes)
            .map_err(|err| HttpError::bad_request(format!("invalid JSON body: {}", err)))
    }
}

impl Encoder for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, HttpError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(HttpError::internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let codec = JsonCodec;
        let value = serde_json::json!({"name": "shrike", "port": 8080});
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn invalid_json_is_a_client_error() {
        let err = JsonCodec.decode(b"{nope").unwrap_err();
        assert_eq!(err.status(), hyper::StatusCode::BAD_REQUEST);
    }
}
