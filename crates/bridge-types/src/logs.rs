//! Request/notification log records.
//!
//! `ApiLog` captures every inbound platform request with truncated
//! bodies; `NotificationLog` captures every webhook delivery attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum stored length for request/response bodies.
pub const API_LOG_BODY_LIMIT: usize = 5_000;

/// One inbound platform request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLog {
	pub id: i64,
	/// Resolved shop, when authentication got that far.
	pub shop_id: Option<i64>,
	/// Endpoint family, e.g. `game_direct` or `general_distill`.
	pub api_type: String,
	pub request_method: String,
	pub request_url: String,
	/// Truncated to [`API_LOG_BODY_LIMIT`] bytes.
	pub request_body: Option<String>,
	pub response_status: u16,
	/// Truncated to [`API_LOG_BODY_LIMIT`] bytes.
	pub response_body: Option<String>,
	pub ip_address: Option<String>,
	pub create_time: DateTime<Utc>,
}

/// The fields recorded for a new api log row.
#[derive(Debug, Clone)]
pub struct ApiLogDraft {
	pub shop_id: Option<i64>,
	pub api_type: String,
	pub request_method: String,
	pub request_url: String,
	pub request_body: Option<String>,
	pub response_status: u16,
	pub response_body: Option<String>,
	pub ip_address: Option<String>,
}

/// Truncates a body to the storable limit on a char boundary.
pub fn truncate_body(body: &str) -> String {
	if body.len() <= API_LOG_BODY_LIMIT {
		return body.to_string();
	}
	let mut end = API_LOG_BODY_LIMIT;
	while !body.is_char_boundary(end) {
		end -= 1;
	}
	body[..end].to_string()
}

/// Notification channel of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
	Dingtalk,
	Wecom,
}

impl NotifyChannel {
	pub fn as_str(&self) -> &'static str {
		match self {
			NotifyChannel::Dingtalk => "dingtalk",
			NotifyChannel::Wecom => "wecom",
		}
	}

	pub fn from_str_opt(v: &str) -> Option<Self> {
		match v {
			"dingtalk" => Some(NotifyChannel::Dingtalk),
			"wecom" => Some(NotifyChannel::Wecom),
			_ => None,
		}
	}
}

/// One webhook delivery attempt for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
	pub id: i64,
	pub order_id: i64,
	pub shop_id: i64,
	pub channel: NotifyChannel,
	/// Whether the webhook acknowledged the message.
	pub success: bool,
	/// 1-based attempt number within one dispatch.
	pub attempt: u32,
	pub request_data: Option<String>,
	pub response_data: Option<String>,
	pub error_message: Option<String>,
	pub create_time: DateTime<Utc>,
}

/// The fields recorded for a new notification log row.
#[derive(Debug, Clone)]
pub struct NotificationLogDraft {
	pub order_id: i64,
	pub shop_id: i64,
	pub channel: NotifyChannel,
	pub success: bool,
	pub attempt: u32,
	pub request_data: Option<String>,
	pub response_data: Option<String>,
	pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncation_respects_limit_and_boundaries() {
		let short = "abc";
		assert_eq!(truncate_body(short), "abc");

		let long = "x".repeat(API_LOG_BODY_LIMIT + 100);
		assert_eq!(truncate_body(&long).len(), API_LOG_BODY_LIMIT);

		// Multibyte content must not be split inside a char.
		let wide = "注".repeat(API_LOG_BODY_LIMIT);
		let cut = truncate_body(&wide);
		assert!(cut.len() <= API_LOG_BODY_LIMIT);
		assert!(std::str::from_utf8(cut.as_bytes()).is_ok());
	}
}
