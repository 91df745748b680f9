//! REST-style inventory dialect.
//!
//! GET/POST requests carrying `api_key` and `timestamp` as ordinary
//! parameters. The signature is the game-style sorted query string with
//! the secret appended as a trailing pseudo-parameter:
//! `MD5(k1=v1&k2=v2&...&secret=<secret>)`, lowercase hex.
//!
//! Reply envelopes in this family are loose; both `code`/`msg`/`data`
//! and `status`/`message`/`result` spellings are accepted.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{CardType, InventoryError, InventoryInterface, INVENTORY_TIMEOUT_SECONDS};
use bridge_types::{unix_timestamp, CardCode};

const LIST_ENDPOINT: &str = "/card/types";
const FETCH_ENDPOINT: &str = "/card/fetch";

/// REST dialect client.
pub struct RestClient {
	base_url: String,
	api_key: String,
	api_secret: String,
	http: reqwest::Client,
}

impl RestClient {
	pub fn new(
		base_url: String,
		api_key: String,
		api_secret: String,
		http: reqwest::Client,
	) -> Self {
		Self {
			base_url,
			api_key,
			api_secret,
			http,
		}
	}

	fn signed_params(&self, mut params: BTreeMap<String, String>) -> BTreeMap<String, String> {
		params.insert("api_key".to_string(), self.api_key.clone());
		params.insert("timestamp".to_string(), unix_timestamp().to_string());
		if !self.api_secret.is_empty() {
			let joined = params
				.iter()
				.filter(|(k, _)| k.as_str() != "sign")
				.map(|(k, v)| format!("{}={}", k, v))
				.collect::<Vec<_>>()
				.join("&");
			let plain = format!("{}&secret={}", joined, self.api_secret);
			params.insert(
				"sign".to_string(),
				format!("{:x}", md5::compute(plain.as_bytes())),
			);
		}
		params
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}{}", self.base_url.trim_end_matches('/'), path)
	}

	/// Unwraps the loose reply envelope into its data payload.
	fn unwrap_reply(value: Value) -> Result<Value, InventoryError> {
		let code = value
			.get("code")
			.or_else(|| value.get("status"))
			.map(|v| match v {
				Value::String(s) => s.clone(),
				Value::Number(n) => n.to_string(),
				_ => String::new(),
			})
			.unwrap_or_default();
		if code != "0" && code != "200" {
			let message = value
				.get("msg")
				.or_else(|| value.get("message"))
				.and_then(Value::as_str)
				.unwrap_or("unknown error");
			return Err(InventoryError::Service(format!("[{}] {}", code, message)));
		}
		Ok(value
			.get("data")
			.or_else(|| value.get("result"))
			.cloned()
			.unwrap_or(Value::Null))
	}
}

fn field_string(item: &Value, keys: &[&str]) -> Option<String> {
	keys.iter().find_map(|k| {
		item.get(*k).and_then(|v| match v {
			Value::String(s) if !s.is_empty() => Some(s.clone()),
			Value::Number(n) => Some(n.to_string()),
			_ => None,
		})
	})
}

fn field_i64(item: &Value, keys: &[&str]) -> i64 {
	keys.iter()
		.find_map(|k| item.get(*k).and_then(Value::as_i64))
		.unwrap_or(0)
}

#[async_trait]
impl InventoryInterface for RestClient {
	async fn list_card_types(&self) -> Result<Vec<CardType>, InventoryError> {
		let params = self.signed_params(BTreeMap::new());
		let response = self
			.http
			.get(self.endpoint(LIST_ENDPOINT))
			.query(&params)
			.timeout(Duration::from_secs(INVENTORY_TIMEOUT_SECONDS))
			.send()
			.await
			.map_err(|e| InventoryError::Network(e.to_string()))?;
		let value: Value = response
			.json()
			.await
			.map_err(|e| InventoryError::Parse(e.to_string()))?;
		let data = Self::unwrap_reply(value)?;

		let items = data.as_array().cloned().unwrap_or_default();
		Ok(items
			.iter()
			.filter_map(|item| {
				let id = field_string(item, &["id", "card_type_id"])?;
				Some(CardType {
					id,
					name: field_string(item, &["name", "title"]).unwrap_or_default(),
					stock: field_i64(item, &["stock", "remaining"]),
					total: field_i64(item, &["total"]),
					used: field_i64(item, &["used"]),
				})
			})
			.collect())
	}

	async fn fetch_cards(
		&self,
		card_type_id: &str,
		quantity: usize,
		order_no: &str,
	) -> Result<Vec<CardCode>, InventoryError> {
		let mut params = BTreeMap::new();
		params.insert("card_type_id".to_string(), card_type_id.to_string());
		params.insert("quantity".to_string(), quantity.to_string());
		params.insert("order_no".to_string(), order_no.to_string());
		let form = self.signed_params(params);

		let response = self
			.http
			.post(self.endpoint(FETCH_ENDPOINT))
			.form(&form)
			.timeout(Duration::from_secs(INVENTORY_TIMEOUT_SECONDS))
			.send()
			.await
			.map_err(|e| InventoryError::Network(e.to_string()))?;
		let value: Value = response
			.json()
			.await
			.map_err(|e| InventoryError::Parse(e.to_string()))?;
		let data = Self::unwrap_reply(value)?;

		let items = data.as_array().cloned().unwrap_or_default();
		Ok(items
			.iter()
			.filter_map(|item| {
				let mut card = CardCode::from_value(item)?;
				if card.expiry.is_none() {
					card.expiry = field_string(item, &["expiry", "expiryDate"]);
				}
				Some(card)
			})
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_string_contains, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn client(base: &str) -> RestClient {
		RestClient::new(
			base.to_string(),
			"key-1".to_string(),
			"secret-1".to_string(),
			reqwest::Client::new(),
		)
	}

	#[tokio::test]
	async fn list_accepts_both_envelope_spellings() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path(LIST_ENDPOINT))
			.and(query_param("api_key", "key-1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"status": 0,
				"message": "ok",
				"result": [
					{"id": "7", "name": "面值50", "stock": 3, "total": 10, "used": 7}
				]
			})))
			.mount(&server)
			.await;

		let types = client(&server.uri()).list_card_types().await.unwrap();
		assert_eq!(types.len(), 1);
		assert_eq!(types[0].stock, 3);
	}

	#[tokio::test]
	async fn fetch_posts_signed_form() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path(FETCH_ENDPOINT))
			.and(body_string_contains("order_no=ORD9"))
			.and(body_string_contains("sign="))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"code": "0",
				"data": [
					{"cardNo": "N1", "cardPwd": "P1", "expiry": "2031-06-30"}
				]
			})))
			.mount(&server)
			.await;

		let cards = client(&server.uri()).fetch_cards("7", 1, "ORD9").await.unwrap();
		assert_eq!(cards.len(), 1);
		assert_eq!(cards[0].expiry.as_deref(), Some("2031-06-30"));
	}

	#[tokio::test]
	async fn error_code_is_service_error() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path(FETCH_ENDPOINT))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"code": "5001",
				"msg": "stock exhausted"
			})))
			.mount(&server)
			.await;

		let err = client(&server.uri())
			.fetch_cards("7", 1, "ORD1")
			.await
			.unwrap_err();
		assert!(matches!(err, InventoryError::Service(m) if m.contains("stock exhausted")));
	}
}
