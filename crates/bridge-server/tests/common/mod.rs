//! Shared harness for router-level tests.
//!
//! Builds the full application around the in-memory store; the memory
//! handle stays available for direct assertions on rows the handlers
//! wrote.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use bridge_callback::CallbackClient;
use bridge_engine::FulfillmentEngine;
use bridge_notify::{Notifier, NotifierSettings};
use bridge_server::server::{build_router, AppState};
use bridge_store::implementations::memory::MemoryStore;
use bridge_store::StoreService;
use bridge_types::{now_utc, DeliverType, InventoryDialect, Product, Shop, ShopType};

pub struct TestApp {
	pub router: Router,
	pub state: AppState,
	pub memory: MemoryStore,
}

pub async fn test_app() -> TestApp {
	let memory = MemoryStore::new();
	let store = Arc::new(StoreService::new(Box::new(memory.clone())));
	let http = reqwest::Client::new();

	let engine = FulfillmentEngine::new(
		Arc::clone(&store),
		CallbackClient::new(http.clone()),
		http.clone(),
	);
	let notifier = Notifier::start(
		Arc::clone(&store),
		http,
		NotifierSettings {
			workers: 1,
			queue_capacity: 16,
			webhook_timeout: Duration::from_secs(2),
			backoff: vec![Duration::ZERO; 3],
		},
	);

	let state = AppState {
		store,
		engine,
		notifier,
	};
	TestApp {
		router: build_router(state.clone()),
		state,
		memory,
	}
}

/// Blank game-channel shop; tests fill in what they exercise.
pub fn game_shop() -> Shop {
	let now = now_utc();
	Shop {
		id: 0,
		shop_name: "Game shop".to_string(),
		shop_code: "TEST01".to_string(),
		shop_type: ShopType::Game,
		game_customer_id: Some("C1".to_string()),
		game_md5_secret: Some("K".to_string()),
		game_direct_callback_url: None,
		game_card_callback_url: None,
		game_api_url: None,
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

/// Blank general-channel shop.
pub fn general_shop() -> Shop {
	let mut shop = game_shop();
	shop.shop_code = "GEN01".to_string();
	shop.shop_type = ShopType::General;
	shop.game_customer_id = None;
	shop.game_md5_secret = None;
	shop.general_vendor_id = Some("V1".to_string());
	shop
}

pub fn auto_product(shop_id: i64, sku_id: &str, card_type_id: &str) -> Product {
	let now = now_utc();
	Product {
		id: 0,
		shop_id,
		product_name: "auto".to_string(),
		sku_id: Some(sku_id.to_string()),
		deliver_type: DeliverType::AutoCard,
		card91_card_type_id: Some(card_type_id.to_string()),
		is_enabled: true,
		create_time: now,
		update_time: now,
	}
}

/// Wires a shop's inventory credentials at a mock server.
pub fn with_inventory(shop: &mut Shop, base_url: &str) {
	shop.card91_dialect = Some(InventoryDialect::Agiso);
	shop.card91_api_url = Some(base_url.to_string());
	shop.card91_api_key = Some("token".to_string());
	shop.card91_api_secret = Some("secret".to_string());
}

pub async fn post_form(
	router: &Router,
	path: &str,
	form: &HashMap<String, String>,
) -> (StatusCode, Value) {
	let body = url::form_urlencoded::Serializer::new(String::new())
		.extend_pairs(form.iter())
		.finish();
	let request = Request::builder()
		.method("POST")
		.uri(path)
		.header(
			header::CONTENT_TYPE,
			"application/x-www-form-urlencoded",
		)
		.body(Body::from(body))
		.unwrap();
	let response = router.clone().oneshot(request).await.unwrap();
	let status = response.status();
	let bytes = response.into_body().collect().await.unwrap().to_bytes();
	let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
	(status, value)
}

pub async fn get_path(router: &Router, path_and_query: &str) -> (StatusCode, Value) {
	let request = Request::builder()
		.method("GET")
		.uri(path_and_query)
		.body(Body::empty())
		.unwrap();
	let response = router.clone().oneshot(request).await.unwrap();
	let status = response.status();
	let bytes = response.into_body().collect().await.unwrap().to_bytes();
	let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
	(status, value)
}

/// Builds a signed game-channel push form around a business object.
pub fn game_push_form(
	customer_id: &str,
	secret: &str,
	biz: &Value,
) -> HashMap<String, String> {
	let mut form = HashMap::new();
	form.insert("customerId".to_string(), customer_id.to_string());
	form.insert("data".to_string(), bridge_sign::encode_envelope(biz));
	form.insert("timestamp".to_string(), "20260801120000".to_string());
	let sign = bridge_sign::game_sign(&form, secret);
	form.insert("sign".to_string(), sign);
	form
}
