//! General channel callback builder and client.
//!
//! The platform expects a flat form `{vendorId, jdOrderNo, agentOrderNo,
//! produceStatus, quantity, timestamp, signType, sign}` POSTed to the
//! `/produce/result` endpoint; card deliveries add a `product` field
//! carrying the AES-ECB ciphertext of the normalized card array. Success
//! is `code == "0"` in the JSON reply.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::{CallbackClient, CallbackError, CALLBACK_TIMEOUT_SECONDS};
use bridge_sign::{aes_ecb_encrypt, general_sign};
use bridge_types::{cards_to_general_json, wire_timestamp, CardCode, Order, Shop};

/// `produceStatus` values on the wire.
const PRODUCE_SUCCESS: &str = "1";
const PRODUCE_FAILURE: &str = "2";

/// Result endpoint suffix required by the platform.
const RESULT_SUFFIX: &str = "/produce/result";

/// Picks the callback URL and ensures the result suffix.
///
/// First non-empty wins: the per-order notify URL, then the shop-level
/// callback URL.
fn callback_url(shop: &Shop, order: &Order) -> Option<String> {
	let base = [order.notify_url.as_deref(), shop.general_callback_url.as_deref()]
		.into_iter()
		.flatten()
		.find(|u| !u.is_empty())?;
	if base.ends_with(RESULT_SUFFIX) {
		Some(base.to_string())
	} else {
		Some(format!("{}{}", base.trim_end_matches('/'), RESULT_SUFFIX))
	}
}

/// Builds the signed form for a fulfillment report.
pub fn build_general_params(
	shop: &Shop,
	order: &Order,
	produce_status: &str,
	product: Option<String>,
) -> HashMap<String, String> {
	let mut params = HashMap::new();
	params.insert(
		"vendorId".to_string(),
		shop.general_vendor_id.clone().unwrap_or_default(),
	);
	params.insert("jdOrderNo".to_string(), order.jd_order_no.clone());
	params.insert("agentOrderNo".to_string(), order.order_no.clone());
	params.insert("produceStatus".to_string(), produce_status.to_string());
	params.insert("quantity".to_string(), order.quantity.max(1).to_string());
	params.insert("timestamp".to_string(), wire_timestamp());
	params.insert("signType".to_string(), "MD5".to_string());

	if let Some(product) = product {
		params.insert("product".to_string(), product);
	}

	if let Some(secret) = shop.general_md5_secret.as_deref().filter(|s| !s.is_empty()) {
		let sign = general_sign(&params, secret);
		params.insert("sign".to_string(), sign);
	}
	params
}

/// Serializes and encrypts cards for the `product` field.
///
/// Without an AES secret the plain JSON is sent, matching the legacy
/// behavior for shops that never configured one.
pub fn build_product_field(shop: &Shop, cards: &[CardCode]) -> String {
	let json = cards_to_general_json(cards);
	match shop.general_aes_secret.as_deref().filter(|s| !s.is_empty()) {
		Some(secret) => aes_ecb_encrypt(&json, secret),
		None => json,
	}
}

impl CallbackClient {
	/// Reports a direct (top-up) order as fulfilled.
	pub async fn general_success(&self, shop: &Shop, order: &Order) -> Result<(), CallbackError> {
		let params = build_general_params(shop, order, PRODUCE_SUCCESS, None);
		self.post_general(shop, order, params).await
	}

	/// Delivers card codes for a card order.
	pub async fn general_card_deliver(
		&self,
		shop: &Shop,
		order: &Order,
		cards: &[CardCode],
	) -> Result<(), CallbackError> {
		let product = build_product_field(shop, cards);
		let params = build_general_params(shop, order, PRODUCE_SUCCESS, Some(product));
		self.post_general(shop, order, params).await
	}

	/// Reports a refund (`produceStatus = 2`).
	pub async fn general_refund(&self, shop: &Shop, order: &Order) -> Result<(), CallbackError> {
		let params = build_general_params(shop, order, PRODUCE_FAILURE, None);
		self.post_general(shop, order, params).await
	}

	async fn post_general(
		&self,
		shop: &Shop,
		order: &Order,
		params: HashMap<String, String>,
	) -> Result<(), CallbackError> {
		let url = callback_url(shop, order).ok_or(CallbackError::NotConfigured)?;
		tracing::debug!(%url, jd_order_no = %order.jd_order_no, "sending general callback");

		let response = self
			.http()
			.post(&url)
			.form(&params)
			.timeout(Duration::from_secs(CALLBACK_TIMEOUT_SECONDS))
			.send()
			.await
			.map_err(|e| CallbackError::Network(e.to_string()))?;

		let reply: Value = response
			.json()
			.await
			.map_err(|e| CallbackError::Parse(e.to_string()))?;

		let code = reply
			.get("code")
			.map(|v| match v {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			})
			.unwrap_or_default();
		if code == "0" {
			Ok(())
		} else {
			Err(CallbackError::Rejected {
				code,
				message: reply
					.get("message")
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string(),
			})
		}
	}
}
