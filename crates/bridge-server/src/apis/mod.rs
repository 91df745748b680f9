//! Channel endpoint handlers.
//!
//! One module per protocol family, plus the small helpers both share
//! for reading loosely-typed business JSON.

/// Game channel endpoints.
pub mod game;
/// General channel endpoints.
pub mod general;

use serde_json::Value;

/// First non-empty string among the aliases of a JSON field.
///
/// Platform payloads carry numbers and strings interchangeably, so
/// numeric values are rendered to their string form.
pub(crate) fn json_field(value: &Value, aliases: &[&str]) -> Option<String> {
	aliases.iter().find_map(|k| match value.get(*k) {
		Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
		Some(Value::Number(n)) => Some(n.to_string()),
		_ => None,
	})
}

/// Parses a currency-unit price (string or number) into fen.
///
/// Returns `None` when no alias is present and `Some(Err)` when a value
/// is present but unparseable; the caller must answer with a
/// validation error rather than defaulting to zero.
pub(crate) fn json_price_fen(
	value: &Value,
	aliases: &[&str],
) -> Option<Result<i64, String>> {
	let raw = json_field(value, aliases)?;
	Some(match raw.parse::<f64>() {
		Ok(v) if v.is_finite() && v >= 0.0 => Ok((v * 100.0).round() as i64),
		_ => Err(raw),
	})
}

/// Parses a positive integer field, defaulting when absent.
pub(crate) fn json_quantity(value: &Value, aliases: &[&str], default: i64) -> Result<i64, String> {
	match json_field(value, aliases) {
		None => Ok(default),
		Some(raw) => match raw.parse::<i64>() {
			Ok(v) if v >= 0 => Ok(v),
			_ => Err(raw),
		},
	}
}
