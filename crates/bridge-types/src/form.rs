//! Inbound form decoding helpers with defensive numeric parsing.
//!
//! Platform pushes arrive as flat string maps with historically unstable
//! field spellings. `FormMap` resolves values through fixed alias lists
//! and parses numbers defensively: an unparseable price is an error, not
//! a silent zero.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while extracting typed values from a form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
	/// No alias of the field carried a non-empty value.
	#[error("missing field: {0}")]
	Missing(&'static str),
	/// The value was present but not parseable as the expected type.
	#[error("invalid value for {field}: {value:?}")]
	Invalid { field: &'static str, value: String },
}

/// A flat inbound form or query-string map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormMap(pub HashMap<String, String>);

impl FormMap {
	pub fn new(map: HashMap<String, String>) -> Self {
		Self(map)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// First non-empty value among the given aliases.
	pub fn get_any(&self, aliases: &[&str]) -> Option<&str> {
		aliases
			.iter()
			.filter_map(|k| self.0.get(*k))
			.map(String::as_str)
			.find(|v| !v.is_empty())
	}

	/// Like [`get_any`](Self::get_any) but owned, trimmed.
	pub fn get_any_string(&self, aliases: &[&str]) -> Option<String> {
		self.get_any(aliases).map(|v| v.trim().to_string())
	}

	/// Required string field.
	pub fn require(&self, name: &'static str, aliases: &[&str]) -> Result<String, FieldError> {
		self.get_any_string(aliases).ok_or(FieldError::Missing(name))
	}

	/// Parses an amount already expressed in fen.
	pub fn parse_fen(&self, name: &'static str, aliases: &[&str]) -> Result<i64, FieldError> {
		let raw = self.require(name, aliases)?;
		let value = raw
			.parse::<i64>()
			.map_err(|_| FieldError::Invalid { field: name, value: raw.clone() })?;
		if value < 0 {
			return Err(FieldError::Invalid { field: name, value: raw });
		}
		Ok(value)
	}

	/// Parses an amount in currency units (may be fractional) into fen.
	///
	/// The push carries prices like `"1.00"`; the stored unit is fen, so
	/// the value is scaled by 100 and rounded.
	pub fn parse_yuan_as_fen(
		&self,
		name: &'static str,
		aliases: &[&str],
	) -> Result<i64, FieldError> {
		let raw = self.require(name, aliases)?;
		let value = raw
			.parse::<f64>()
			.map_err(|_| FieldError::Invalid { field: name, value: raw.clone() })?;
		if !value.is_finite() || value < 0.0 {
			return Err(FieldError::Invalid { field: name, value: raw });
		}
		Ok((value * 100.0).round() as i64)
	}

	/// Parses a positive quantity, defaulting to 1 when absent.
	pub fn parse_quantity(
		&self,
		name: &'static str,
		aliases: &[&str],
	) -> Result<i64, FieldError> {
		let raw = match self.get_any_string(aliases) {
			Some(v) => v,
			None => return Ok(1),
		};
		let value = raw
			.parse::<i64>()
			.map_err(|_| FieldError::Invalid { field: name, value: raw.clone() })?;
		if value < 0 {
			return Err(FieldError::Invalid { field: name, value: raw });
		}
		Ok(value)
	}

	/// The underlying map, for signing.
	pub fn as_map(&self) -> &HashMap<String, String> {
		&self.0
	}
}

impl From<HashMap<String, String>> for FormMap {
	fn from(map: HashMap<String, String>) -> Self {
		Self(map)
	}
}
