//! Configuration validation for TOML-backed factories.
//!
//! Backend factories receive their configuration as a raw `toml::Value`;
//! each implementation declares a small schema of required and optional
//! fields so a typo fails at startup with a precise message instead of
//! surfacing later as a missing credential.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// A required field is absent.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// A field is present with an unacceptable value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// A field has the wrong TOML type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// The TOML type a configuration field must have.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
}

/// One field of a configuration schema.
#[derive(Debug)]
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
		}
	}
}

/// A flat schema of required and optional fields.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			check_type(&field.name, value, field.field_type)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				check_type(&field.name, value, field.field_type)?;
			}
		}

		Ok(())
	}
}

fn check_type(
	name: &str,
	value: &toml::Value,
	expected: FieldType,
) -> Result<(), ValidationError> {
	let mismatch = |kind: &str| ValidationError::TypeMismatch {
		field: name.to_string(),
		expected: kind.to_string(),
		actual: value.type_str().to_string(),
	};

	match expected {
		FieldType::String => {
			if !value.is_str() {
				return Err(mismatch("string"));
			}
		}
		FieldType::Integer { min, max } => {
			let v = value.as_integer().ok_or_else(|| mismatch("integer"))?;
			if let Some(lo) = min {
				if v < lo {
					return Err(ValidationError::InvalidValue {
						field: name.to_string(),
						message: format!("value {} is less than minimum {}", v, lo),
					});
				}
			}
			if let Some(hi) = max {
				if v > hi {
					return Err(ValidationError::InvalidValue {
						field: name.to_string(),
						message: format!("value {} is greater than maximum {}", v, hi),
					});
				}
			}
		}
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(mismatch("boolean"));
			}
		}
	}

	Ok(())
}

/// Trait implemented by each backend's configuration schema.
#[async_trait]
pub trait ConfigSchema: Send + Sync {
	/// Validates a TOML configuration value against this schema.
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
