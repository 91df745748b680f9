//! Webhook senders for the two robot dialects.
//!
//! Both robots accept a JSON markdown message and answer
//! `{"errcode": 0}` on success. DingTalk additionally supports a signed
//! webhook: a millisecond timestamp and an HMAC-SHA256 of
//! `"{timestamp}\n{secret}"` keyed by the secret, base64- then
//! percent-encoded into the query string.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::NotifyError;
use bridge_types::{NotifyChannel, Shop};

type HmacSha256 = Hmac<Sha256>;

/// Computes the DingTalk webhook signature for a millisecond timestamp.
fn dingtalk_sign(timestamp_ms: u64, secret: &str) -> String {
	let plain = format!("{}\n{}", timestamp_ms, secret);
	let mut mac =
		HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
	mac.update(plain.as_bytes());
	let digest = mac.finalize().into_bytes();
	urlencoding::encode(&STANDARD.encode(digest)).into_owned()
}

fn dingtalk_url(webhook: &str, secret: Option<&str>) -> String {
	match secret.filter(|s| !s.is_empty()) {
		Some(secret) => {
			let timestamp = std::time::SystemTime::now()
				.duration_since(std::time::UNIX_EPOCH)
				.map(|d| d.as_millis() as u64)
				.unwrap_or(0);
			let sign = dingtalk_sign(timestamp, secret);
			let sep = if webhook.contains('?') { '&' } else { '?' };
			format!("{}{}timestamp={}&sign={}", webhook, sep, timestamp, sign)
		}
		None => webhook.to_string(),
	}
}

fn message_body(channel: NotifyChannel, text: &str) -> Value {
	match channel {
		NotifyChannel::Dingtalk => json!({
			"msgtype": "markdown",
			"markdown": { "title": "新订单通知", "text": text },
		}),
		NotifyChannel::Wecom => json!({
			"msgtype": "markdown",
			"markdown": { "content": text },
		}),
	}
}

/// Sends one message to one channel, returning the raw reply body.
pub async fn send(
	http: &reqwest::Client,
	timeout: Duration,
	shop: &Shop,
	channel: NotifyChannel,
	text: &str,
) -> Result<String, NotifyError> {
	let url = match channel {
		NotifyChannel::Dingtalk => {
			let webhook = shop
				.dingtalk_webhook
				.as_deref()
				.filter(|u| !u.is_empty())
				.ok_or(NotifyError::NoChannel)?;
			dingtalk_url(webhook, shop.dingtalk_secret.as_deref())
		}
		NotifyChannel::Wecom => shop
			.wecom_webhook
			.as_deref()
			.filter(|u| !u.is_empty())
			.ok_or(NotifyError::NoChannel)?
			.to_string(),
	};

	let response = http
		.post(&url)
		.json(&message_body(channel, text))
		.timeout(timeout)
		.send()
		.await
		.map_err(|e| NotifyError::Network(e.to_string()))?;

	let body = response
		.text()
		.await
		.map_err(|e| NotifyError::Network(e.to_string()))?;

	let errcode = serde_json::from_str::<Value>(&body)
		.ok()
		.and_then(|v| v.get("errcode").and_then(Value::as_i64));
	match errcode {
		Some(0) => Ok(body),
		Some(code) => Err(NotifyError::Rejected(format!("errcode {}: {}", code, body))),
		None => Err(NotifyError::Rejected(format!("unrecognized reply: {}", body))),
	}
}
