//! Game channel callback builder and client.
//!
//! The platform expects a form body `{customerId, timestamp, data, sign}`
//! where `data` is the base64-JSON envelope of the business object and
//! `sign` is the game MD5 scheme over the other three fields. Success is
//! `retCode == "100"` in the JSON reply.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};

use crate::{CallbackClient, CallbackError, CALLBACK_TIMEOUT_SECONDS};
use bridge_sign::{encode_envelope, game_sign};
use bridge_types::{wire_timestamp, CardCode, Order, OrderType, Shop};

/// Failure code reported with refund callbacks.
const REFUND_FAILED_CODE: i64 = 999;
const REFUND_FAILED_REASON: &str = "商家退款";

/// Chooses the callback URL for a direct fulfillment report.
///
/// First non-empty wins: direct URL, generic API URL, card URL.
fn direct_url(shop: &Shop) -> Option<&str> {
	[
		shop.game_direct_callback_url.as_deref(),
		shop.game_api_url.as_deref(),
		shop.game_card_callback_url.as_deref(),
	]
	.into_iter()
	.flatten()
	.find(|u| !u.is_empty())
}

/// Chooses the callback URL for a card delivery report.
fn card_url(shop: &Shop) -> Option<&str> {
	[
		shop.game_card_callback_url.as_deref(),
		shop.game_api_url.as_deref(),
		shop.game_direct_callback_url.as_deref(),
	]
	.into_iter()
	.flatten()
	.find(|u| !u.is_empty())
}

/// Builds the signed outer form for a business object.
pub fn build_game_params(shop: &Shop, data: &Value) -> HashMap<String, String> {
	let mut params = HashMap::new();
	params.insert(
		"customerId".to_string(),
		shop.game_customer_id.clone().unwrap_or_default(),
	);
	params.insert("timestamp".to_string(), wire_timestamp());
	params.insert("data".to_string(), encode_envelope(data));

	if let Some(secret) = shop.game_md5_secret.as_deref().filter(|s| !s.is_empty()) {
		let sign = game_sign(&params, secret);
		params.insert("sign".to_string(), sign);
	}
	params
}

impl CallbackClient {
	/// Reports a direct (top-up) order as fulfilled.
	pub async fn game_direct_success(
		&self,
		shop: &Shop,
		order: &Order,
	) -> Result<(), CallbackError> {
		let data = json!({ "orderId": order.jd_order_no, "orderStatus": 0 });
		let url = direct_url(shop).ok_or(CallbackError::NotConfigured)?;
		self.post_game(url, shop, &data).await
	}

	/// Delivers card codes for a card order.
	pub async fn game_card_deliver(
		&self,
		shop: &Shop,
		order: &Order,
		cards: &[CardCode],
	) -> Result<(), CallbackError> {
		let infos: Vec<Value> = cards.iter().map(CardCode::to_game_callback).collect();
		let data = json!({
			"orderId": order.jd_order_no,
			"orderStatus": 0,
			"cardinfos": infos,
		});
		let url = card_url(shop).ok_or(CallbackError::NotConfigured)?;
		self.post_game(url, shop, &data).await
	}

	/// Reports a refund; the URL chain follows the order type.
	pub async fn game_refund(&self, shop: &Shop, order: &Order) -> Result<(), CallbackError> {
		let data = json!({
			"orderId": order.jd_order_no,
			"orderStatus": 2,
			"failedCode": REFUND_FAILED_CODE,
			"failedReason": REFUND_FAILED_REASON,
		});
		let url = match order.order_type {
			OrderType::Card => card_url(shop),
			OrderType::Direct => direct_url(shop),
		}
		.ok_or(CallbackError::NotConfigured)?;
		self.post_game(url, shop, &data).await
	}

	async fn post_game(
		&self,
		url: &str,
		shop: &Shop,
		data: &Value,
	) -> Result<(), CallbackError> {
		let params = build_game_params(shop, data);
		tracing::debug!(url, order = ?data.get("orderId"), "sending game callback");

		let response = self
			.http()
			.post(url)
			.form(&params)
			.timeout(Duration::from_secs(CALLBACK_TIMEOUT_SECONDS))
			.send()
			.await
			.map_err(|e| CallbackError::Network(e.to_string()))?;

		let reply: Value = response
			.json()
			.await
			.map_err(|e| CallbackError::Parse(e.to_string()))?;

		let ret_code = reply
			.get("retCode")
			.map(|v| match v {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			})
			.unwrap_or_default();
		if ret_code == "100" {
			Ok(())
		} else {
			Err(CallbackError::Rejected {
				code: ret_code,
				message: reply
					.get("retMessage")
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string(),
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_sign::{decode_envelope, verify_game_sign};
	use bridge_types::{now_utc, NotifyStatus, OrderStatus, ShopType};
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, Request, ResponseTemplate};

	fn shop(direct: Option<String>, card: Option<String>, api: Option<String>) -> Shop {
		let now = now_utc();
		Shop {
			id: 1,
			shop_name: "s".to_string(),
			shop_code: "TEST01".to_string(),
			shop_type: ShopType::Game,
			game_customer_id: Some("C1".to_string()),
			game_md5_secret: Some("K".to_string()),
			game_direct_callback_url: direct,
			game_card_callback_url: card,
			game_api_url: api,
			general_vendor_id: None,
			general_md5_secret: None,
			general_aes_secret: None,
			general_callback_url: None,
			card91_dialect: None,
			card91_api_url: None,
			card91_api_key: None,
			card91_api_secret: None,
			notify_enabled: false,
			dingtalk_webhook: None,
			dingtalk_secret: None,
			wecom_webhook: None,
			is_enabled: true,
			expire_time: None,
			create_time: now,
			update_time: now,
		}
	}

	fn order(order_type: OrderType) -> Order {
		let now = now_utc();
		Order {
			id: 1,
			order_no: "ORD1".to_string(),
			jd_order_no: "JD01".to_string(),
			shop_id: 1,
			shop_type: ShopType::Game,
			order_type,
			order_status: OrderStatus::Pending,
			sku_id: None,
			product_info: None,
			amount: 100,
			quantity: 1,
			produce_account: None,
			card_info: None,
			notify_url: None,
			notify_status: NotifyStatus::None,
			notify_time: None,
			notified: false,
			notify_send_time: None,
			pay_time: None,
			deliver_time: None,
			remark: None,
			create_time: now,
			update_time: now,
		}
	}

	fn form_of(request: &Request) -> HashMap<String, String> {
		url::form_urlencoded::parse(&request.body)
			.into_owned()
			.collect()
	}

	#[tokio::test]
	async fn direct_success_posts_signed_envelope() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/d"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(serde_json::json!({"retCode": "100"})),
			)
			.mount(&server)
			.await;

		let shop = shop(Some(format!("{}/d", server.uri())), None, None);
		let client = CallbackClient::default();
		client
			.game_direct_success(&shop, &order(OrderType::Direct))
			.await
			.unwrap();

		let requests = server.received_requests().await.unwrap();
		assert_eq!(requests.len(), 1);
		let form = form_of(&requests[0]);
		assert_eq!(form.get("customerId").map(String::as_str), Some("C1"));
		assert!(verify_game_sign(&form, "K"));

		let data = decode_envelope(form.get("data").unwrap()).unwrap();
		assert_eq!(data["orderId"], "JD01");
		assert_eq!(data["orderStatus"], 0);
	}

	#[tokio::test]
	async fn card_deliver_uses_lowercase_card_fields() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/c"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(serde_json::json!({"retCode": "100"})),
			)
			.mount(&server)
			.await;

		let shop = shop(None, Some(format!("{}/c", server.uri())), None);
		let client = CallbackClient::default();
		let cards = vec![CardCode::new("N1", "P1")];
		client
			.game_card_deliver(&shop, &order(OrderType::Card), &cards)
			.await
			.unwrap();

		let requests = server.received_requests().await.unwrap();
		let form = form_of(&requests[0]);
		let data = decode_envelope(form.get("data").unwrap()).unwrap();
		assert_eq!(data["cardinfos"][0]["cardno"], "N1");
		assert_eq!(data["cardinfos"][0]["cardpass"], "P1");
	}

	#[tokio::test]
	async fn refund_carries_failure_detail_and_follows_order_type() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/card-route"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(serde_json::json!({"retCode": "100"})),
			)
			.mount(&server)
			.await;

		// Card refund prefers the card URL over the direct URL.
		let shop = shop(
			Some("http://unused.invalid/d".to_string()),
			Some(format!("{}/card-route", server.uri())),
			None,
		);
		let client = CallbackClient::default();
		client
			.game_refund(&shop, &order(OrderType::Card))
			.await
			.unwrap();

		let requests = server.received_requests().await.unwrap();
		let form = form_of(&requests[0]);
		let data = decode_envelope(form.get("data").unwrap()).unwrap();
		assert_eq!(data["orderStatus"], 2);
		assert_eq!(data["failedCode"], 999);
	}

	#[tokio::test]
	async fn non_100_reply_is_rejected() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/d"))
			.respond_with(ResponseTemplate::new(200).set_body_json(
				serde_json::json!({"retCode": "200", "retMessage": "签名验证失败"}),
			))
			.mount(&server)
			.await;

		let shop = shop(Some(format!("{}/d", server.uri())), None, None);
		let err = CallbackClient::default()
			.game_direct_success(&shop, &order(OrderType::Direct))
			.await
			.unwrap_err();
		assert!(matches!(err, CallbackError::Rejected { code, .. } if code == "200"));
	}

	#[tokio::test]
	async fn missing_url_is_not_configured() {
		let shop = shop(None, None, None);
		let err = CallbackClient::default()
			.game_direct_success(&shop, &order(OrderType::Direct))
			.await
			.unwrap_err();
		assert!(matches!(err, CallbackError::NotConfigured));
	}
}
