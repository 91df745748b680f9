//! Outbound platform callbacks for the order bridge.
//!
//! Per channel this crate builds the signed fulfillment report, POSTs it
//! to the platform's callback endpoint and classifies the reply. The
//! client never retries on its own: a failed callback is recorded on
//! the order and retried through an operator action.

/// Game channel callback builder and client.
pub mod game;
/// General channel callback builder and client.
pub mod general;

use thiserror::Error;

/// Timeout for one callback attempt.
pub const CALLBACK_TIMEOUT_SECONDS: u64 = 10;

/// Errors that can occur during a callback attempt.
///
/// Every variant reaches the engine as a reason string recorded in the
/// order event log.
#[derive(Debug, Error)]
pub enum CallbackError {
	/// The shop has no usable callback URL configured.
	#[error("no callback url configured")]
	NotConfigured,
	/// Network-level failure reaching the platform.
	#[error("network error: {0}")]
	Network(String),
	/// The reply body was not parseable JSON.
	#[error("reply parse error: {0}")]
	Parse(String),
	/// The platform answered with a non-success code.
	#[error("platform rejected callback: [{code}] {message}")]
	Rejected { code: String, message: String },
}

/// Shared callback HTTP client.
///
/// One instance per process; holds the pooled reqwest client used for
/// every outbound callback on both channels.
#[derive(Clone)]
pub struct CallbackClient {
	http: reqwest::Client,
}

impl CallbackClient {
	pub fn new(http: reqwest::Client) -> Self {
		Self { http }
	}

	pub(crate) fn http(&self) -> &reqwest::Client {
		&self.http
	}
}

impl Default for CallbackClient {
	fn default() -> Self {
		Self::new(reqwest::Client::new())
	}
}
