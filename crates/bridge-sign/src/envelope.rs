//! Base64-JSON data envelope of the game channel.
//!
//! The game platform wraps its business object in a `data` form field:
//! compact JSON (UTF-8, no ASCII escaping), standard base64. Inbound
//! payloads are less disciplined: URL-safe base64 and GBK-encoded JSON
//! both occur in the wild, so decoding normalizes the alphabet, fixes
//! padding, and falls back to GBK when the bytes are not UTF-8.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Errors raised while decoding an inbound envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
	#[error("invalid base64: {0}")]
	Base64(String),
	#[error("invalid JSON payload: {0}")]
	Json(String),
}

/// Encodes a business object into the `data` field value.
pub fn encode_envelope(data: &serde_json::Value) -> String {
	let json = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());
	STANDARD.encode(json.as_bytes())
}

/// Decodes an inbound `data` field into a business object.
pub fn decode_envelope(data: &str) -> Result<serde_json::Value, EnvelopeError> {
	let bytes = decode_base64_lenient(data)?;
	let text = match std::str::from_utf8(&bytes) {
		Ok(s) => s.to_string(),
		Err(_) => {
			// Legacy platform clients still send GBK-encoded JSON.
			let (decoded, _, _) = encoding_rs::GBK.decode(&bytes);
			decoded.into_owned()
		}
	};
	serde_json::from_str(&text).map_err(|e| EnvelopeError::Json(e.to_string()))
}

/// Standard base64 first; on failure normalize the URL-safe alphabet and
/// repair missing padding, then retry.
fn decode_base64_lenient(data: &str) -> Result<Vec<u8>, EnvelopeError> {
	if let Ok(bytes) = STANDARD.decode(data.as_bytes()) {
		return Ok(bytes);
	}
	let mut normalized = data.replace('-', "+").replace('_', "/");
	while normalized.len() % 4 != 0 {
		normalized.push('=');
	}
	STANDARD
		.decode(normalized.as_bytes())
		.map_err(|e| EnvelopeError::Base64(e.to_string()))
}
