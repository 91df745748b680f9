//! Agiso-style inventory dialect.
//!
//! POST form requests against the Agiso open-platform gateway with
//! `Authorization: Bearer` and `ApiVersion` headers. Every request
//! carries a unix-seconds `timestamp`; the signature wraps the sorted
//! `k1v1k2v2...` concatenation in the secret on both sides:
//! `MD5(secret + kv... + secret)`, lowercase hex.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{CardType, InventoryError, InventoryInterface, INVENTORY_TIMEOUT_SECONDS};
use bridge_types::{unix_timestamp, CardCode};

const DEFAULT_BASE_URL: &str = "https://gw-api.agiso.com";
const LIST_ENDPOINT: &str = "/acpr/CardPwd/GetList";
const PICK_ENDPOINT: &str = "/acpr/CardPwd/HandPick";

/// Gateway reply envelope.
#[derive(Debug, Deserialize)]
struct AgisoReply {
	#[serde(rename = "IsSuccess", default)]
	is_success: bool,
	#[serde(rename = "Error_Code", default)]
	error_code: i64,
	#[serde(rename = "Error_Msg", default)]
	error_msg: String,
	#[serde(rename = "Data")]
	data: Option<Value>,
}

/// Agiso dialect client.
pub struct AgisoClient {
	base_url: String,
	access_token: String,
	app_secret: String,
	http: reqwest::Client,
}

impl AgisoClient {
	pub fn new(
		base_url: Option<String>,
		access_token: String,
		app_secret: String,
		http: reqwest::Client,
	) -> Self {
		Self {
			base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
			access_token,
			app_secret,
			http,
		}
	}

	/// Sign: secret wrapped around the sorted key-value concatenation.
	fn sign(&self, params: &BTreeMap<String, String>) -> String {
		let mut plain = self.app_secret.clone();
		for (k, v) in params {
			if k == "sign" {
				continue;
			}
			plain.push_str(k);
			plain.push_str(v);
		}
		plain.push_str(&self.app_secret);
		format!("{:x}", md5::compute(plain.as_bytes()))
	}

	async fn request(
		&self,
		endpoint: &str,
		params: BTreeMap<String, String>,
	) -> Result<Value, InventoryError> {
		let mut form = params;
		form.insert("timestamp".to_string(), unix_timestamp().to_string());
		if !self.app_secret.is_empty() {
			let sign = self.sign(&form);
			form.insert("sign".to_string(), sign);
		}

		let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);
		let response = self
			.http
			.post(&url)
			.header("Authorization", format!("Bearer {}", self.access_token))
			.header("ApiVersion", "1")
			.form(&form)
			.timeout(Duration::from_secs(INVENTORY_TIMEOUT_SECONDS))
			.send()
			.await
			.map_err(|e| InventoryError::Network(e.to_string()))?;

		let reply: AgisoReply = response
			.json()
			.await
			.map_err(|e| InventoryError::Parse(e.to_string()))?;

		if !reply.is_success {
			tracing::warn!(
				endpoint,
				code = reply.error_code,
				"inventory gateway error: {}",
				reply.error_msg
			);
			return Err(InventoryError::Service(if reply.error_msg.is_empty() {
				format!("error code {}", reply.error_code)
			} else {
				reply.error_msg
			}));
		}

		reply
			.data
			.ok_or_else(|| InventoryError::Parse("reply carries no data".to_string()))
	}
}

fn value_as_string(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		_ => String::new(),
	}
}

#[async_trait]
impl InventoryInterface for AgisoClient {
	async fn list_card_types(&self) -> Result<Vec<CardType>, InventoryError> {
		let mut params = BTreeMap::new();
		params.insert("pageIndex".to_string(), "1".to_string());
		params.insert("pageSize".to_string(), "100".to_string());

		let data = self.request(LIST_ENDPOINT, params).await?;
		let items = data
			.get("List")
			.or_else(|| data.get("list"))
			.and_then(Value::as_array)
			.cloned()
			.unwrap_or_default();

		Ok(items
			.iter()
			.filter_map(|item| {
				let id = item.get("IdNo").map(value_as_string)?;
				Some(CardType {
					id,
					name: item
						.get("Title")
						.and_then(Value::as_str)
						.unwrap_or_default()
						.to_string(),
					stock: item.get("RemainingCount").and_then(Value::as_i64).unwrap_or(0),
					total: item.get("TotalCount").and_then(Value::as_i64).unwrap_or(0),
					used: item.get("UsedCount").and_then(Value::as_i64).unwrap_or(0),
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
		params.insert("cpkId".to_string(), card_type_id.to_string());
		params.insert("num".to_string(), quantity.to_string());
		params.insert("handPickOrderId".to_string(), order_no.to_string());

		let data = self.request(PICK_ENDPOINT, params).await?;
		let items = data
			.get("CardPwdArr")
			.and_then(Value::as_array)
			.cloned()
			.unwrap_or_default();

		Ok(items
			.iter()
			.filter_map(|item| {
				let card_no = item.get("c").map(value_as_string)?;
				let mut card = CardCode::new(
					card_no,
					item.get("p").map(value_as_string).unwrap_or_default(),
				);
				card.expiry = item
					.get("d")
					.map(value_as_string)
					.filter(|d| !d.is_empty());
				Some(card)
			})
			.collect())
	}
}
