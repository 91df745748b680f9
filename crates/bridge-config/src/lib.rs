//! Configuration module for the order bridge.
//!
//! Configuration is a single TOML file: service identity, HTTP bind
//! address, store backend selection, notifier worker pool sizing and
//! outbound HTTP timeouts. Secrets such as the database DSN may be
//! injected through `${VAR}` environment references.

use std::collections::HashMap;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the bridge service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Service identity.
	pub bridge: BridgeConfig,
	/// HTTP server bind configuration.
	#[serde(default)]
	pub server: ServerConfig,
	/// Store backend selection and per-implementation settings.
	pub store: StoreConfig,
	/// Notification fan-out worker pool.
	#[serde(default)]
	pub notifier: NotifierConfig,
	/// Outbound HTTP timeouts.
	#[serde(default)]
	pub http: HttpConfig,
}

/// Service identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
	/// Unique identifier for this bridge instance, used in logs.
	pub id: String,
}

/// HTTP server bind configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_port")]
	pub port: u16,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			host: default_host(),
			port: default_port(),
		}
	}
}

fn default_host() -> String {
	"127.0.0.1".to_string()
}

fn default_port() -> u16 {
	8080
}

/// Store backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of store implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Notification fan-out worker pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
	/// Number of background delivery workers.
	#[serde(default = "default_notifier_workers")]
	pub workers: usize,
	/// Bounded queue depth between handlers and workers.
	#[serde(default = "default_notifier_queue")]
	pub queue_capacity: usize,
}

impl Default for NotifierConfig {
	fn default() -> Self {
		Self {
			workers: default_notifier_workers(),
			queue_capacity: default_notifier_queue(),
		}
	}
}

fn default_notifier_workers() -> usize {
	4
}

fn default_notifier_queue() -> usize {
	256
}

/// Outbound HTTP timeouts in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
	/// Platform callback attempts.
	#[serde(default = "default_callback_timeout")]
	pub callback_timeout_seconds: u64,
	/// Inventory service RPCs.
	#[serde(default = "default_inventory_timeout")]
	pub inventory_timeout_seconds: u64,
	/// Notification webhooks.
	#[serde(default = "default_webhook_timeout")]
	pub webhook_timeout_seconds: u64,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			callback_timeout_seconds: default_callback_timeout(),
			inventory_timeout_seconds: default_inventory_timeout(),
			webhook_timeout_seconds: default_webhook_timeout(),
		}
	}
}

fn default_callback_timeout() -> u64 {
	10
}

fn default_inventory_timeout() -> u64 {
	30
}

fn default_webhook_timeout() -> u64 {
	10
}

/// Expands `${NAME}` and `${NAME:-fallback}` environment references.
///
/// The output is rebuilt in one forward pass: literal text between
/// references is copied through untouched, each reference is replaced by
/// the variable's value or its inline fallback, and a reference to an
/// unset variable without a fallback aborts the load.
fn expand_env_refs(raw: &str) -> Result<String, ConfigError> {
	let pattern = Regex::new(r"\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<fallback>[^}]*))?\}")
		.map_err(|e| ConfigError::Parse(e.to_string()))?;

	let mut expanded = String::with_capacity(raw.len());
	let mut cursor = 0;
	for caps in pattern.captures_iter(raw) {
		let Some(whole) = caps.get(0) else { continue };
		expanded.push_str(&raw[cursor..whole.start()]);
		cursor = whole.end();

		let name = &caps["name"];
		match std::env::var(name) {
			Ok(value) => expanded.push_str(&value),
			Err(_) => match caps.name("fallback") {
				Some(fallback) => expanded.push_str(fallback.as_str()),
				None => {
					return Err(ConfigError::Validation(format!(
						"config references unset environment variable {}",
						name
					)))
				}
			},
		}
	}
	expanded.push_str(&raw[cursor..]);

	Ok(expanded)
}

impl Config {
	/// Loads configuration from a file, resolving environment references.
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		let resolved = expand_env_refs(&content)?;
		resolved.parse()
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.bridge.id.is_empty() {
			return Err(ConfigError::Validation("Bridge ID cannot be empty".into()));
		}
		if self.store.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Store primary implementation cannot be empty".into(),
			));
		}
		if !self.store.implementations.contains_key(&self.store.primary) {
			return Err(ConfigError::Validation(format!(
				"Store implementation '{}' has no configuration section",
				self.store.primary
			)));
		}
		if self.notifier.workers == 0 {
			return Err(ConfigError::Validation(
				"Notifier worker count must be at least 1".into(),
			));
		}
		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let config: Config = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}
}
