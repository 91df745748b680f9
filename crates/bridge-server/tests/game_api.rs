//! Game channel endpoint tests.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bridge_store::StoreInterface;
use bridge_types::{CardCode, EventType, NotifyStatus, OrderStatus, OrderType, ShopType};
use common::*;

#[tokio::test]
async fn direct_push_creates_pending_order() {
	let app = test_app().await;
	app.memory.insert_shop(&game_shop()).await.unwrap();

	let biz = json!({
		"orderId": "JD01",
		"skuId": "S",
		"totalPrice": "1.00",
		"buyNum": "1",
		"gameAccount": "A",
	});
	let form = game_push_form("C1", "K", &biz);
	let (status, reply) = post_form(&app.router, "/api/game/direct", &form).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(reply["retCode"], "100");
	assert_eq!(reply["retMessage"], "接收成功");

	let order = app
		.memory
		.find_order("JD01", None)
		.await
		.unwrap()
		.expect("order row");
	assert_eq!(order.amount, 100);
	assert_eq!(order.quantity, 1);
	assert_eq!(order.order_type, OrderType::Direct);
	assert_eq!(order.shop_type, ShopType::Game);
	assert_eq!(order.order_status, OrderStatus::Pending);
	assert_eq!(order.produce_account.as_deref(), Some("A"));
	assert!(order.order_no.starts_with("ORD"));

	let events = app.memory.events_for_order(order.id).await.unwrap();
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].event_type, EventType::OrderCreated);
}

#[tokio::test]
async fn manual_success_after_push_completes_order() {
	let callback = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/d"))
		.respond_with(
			ResponseTemplate::new(200).set_body_json(json!({"retCode": "100"})),
		)
		.mount(&callback)
		.await;

	let app = test_app().await;
	let mut shop = game_shop();
	shop.game_direct_callback_url = Some(format!("{}/d", callback.uri()));
	let shop_id = app.memory.insert_shop(&shop).await.unwrap();

	let biz = json!({"orderId": "JD01", "totalPrice": "1.00", "buyNum": "1", "gameAccount": "A"});
	post_form(&app.router, "/api/game/direct", &game_push_form("C1", "K", &biz)).await;

	let order = app.memory.find_order("JD01", None).await.unwrap().unwrap();
	let shop = app.memory.shop_by_id(shop_id).await.unwrap();
	app.state
		.engine
		.manual_direct_success(&order, &shop, "admin")
		.await
		.unwrap();

	let done = app.memory.order_by_id(order.id).await.unwrap();
	assert_eq!(done.order_status, OrderStatus::Done);
	assert_eq!(done.notify_status, NotifyStatus::Ok);

	// The callback body carried the envelope of {"orderId":"JD01","orderStatus":0}.
	let requests = callback.received_requests().await.unwrap();
	assert_eq!(requests.len(), 1);
	let body = String::from_utf8_lossy(&requests[0].body).into_owned();
	let data = body
		.split('&')
		.find_map(|pair| pair.strip_prefix("data="))
		.map(|v| urlencoding_decode(v))
		.unwrap();
	let decoded = bridge_sign::decode_envelope(&data).unwrap();
	assert_eq!(decoded["orderId"], "JD01");
	assert_eq!(decoded["orderStatus"], 0);
}

fn urlencoding_decode(v: &str) -> String {
	url::form_urlencoded::parse(format!("k={}", v).as_bytes())
		.find(|(k, _)| k == "k")
		.map(|(_, v)| v.into_owned())
		.unwrap_or_default()
}

#[tokio::test]
async fn duplicate_pushes_yield_one_order_and_one_event() {
	let app = test_app().await;
	app.memory.insert_shop(&game_shop()).await.unwrap();

	let biz = json!({"orderId": "JD01", "totalPrice": "1.00", "buyNum": "1", "gameAccount": "A"});
	let form = game_push_form("C1", "K", &biz);

	let (first, second) = tokio::join!(
		post_form(&app.router, "/api/game/direct", &form),
		post_form(&app.router, "/api/game/direct", &form),
	);
	assert_eq!(first.1["retCode"], "100");
	assert_eq!(second.1["retCode"], "100");

	let order = app.memory.find_order("JD01", None).await.unwrap().unwrap();
	let events = app.memory.events_for_order(order.id).await.unwrap();
	let created: Vec<_> = events
		.iter()
		.filter(|e| e.event_type == EventType::OrderCreated)
		.collect();
	assert_eq!(created.len(), 1);
}

#[tokio::test]
async fn invalid_signature_is_rejected_and_logged() {
	let app = test_app().await;
	app.memory.insert_shop(&game_shop()).await.unwrap();

	let biz = json!({"orderId": "JD01", "totalPrice": "1.00"});
	let mut form = game_push_form("C1", "K", &biz);
	form.insert("sign".to_string(), "bad".to_string());

	let (status, reply) = post_form(&app.router, "/api/game/direct", &form).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(reply["retCode"], "200");
	assert_eq!(reply["retMessage"], "签名验证失败");

	assert!(app.memory.find_order("JD01", None).await.unwrap().is_none());

	let log = app.memory.last_api_log().await.expect("api log row");
	assert_eq!(log.api_type, "game_direct");
	assert_eq!(log.response_status, 200);
	assert!(log.request_body.as_deref().unwrap_or_default().contains("sign=bad"));
}

#[tokio::test]
async fn expired_shop_is_rejected() {
	let app = test_app().await;
	let mut shop = game_shop();
	shop.expire_time = Some(bridge_types::now_utc() - chrono::Duration::days(1));
	app.memory.insert_shop(&shop).await.unwrap();

	let biz = json!({"orderId": "JD01", "totalPrice": "1.00"});
	let (_, reply) =
		post_form(&app.router, "/api/game/direct", &game_push_form("C1", "K", &biz)).await;
	assert_eq!(reply["retCode"], "200");
	assert_eq!(reply["retMessage"], "店铺已到期");
}

#[tokio::test]
async fn garbage_price_is_a_validation_error() {
	let app = test_app().await;
	app.memory.insert_shop(&game_shop()).await.unwrap();

	let biz = json!({"orderId": "JD01", "totalPrice": "not-a-price"});
	let (_, reply) =
		post_form(&app.router, "/api/game/direct", &game_push_form("C1", "K", &biz)).await;
	assert_eq!(reply["retCode"], "200");
	assert_eq!(reply["retMessage"], "金额格式错误");
	assert!(app.memory.find_order("JD01", None).await.unwrap().is_none());
}

#[tokio::test]
async fn direct_query_maps_done_to_success() {
	let app = test_app().await;
	app.memory.insert_shop(&game_shop()).await.unwrap();

	let biz = json!({"orderId": "JD01", "totalPrice": "1.00", "buyNum": "1"});
	post_form(&app.router, "/api/game/direct", &game_push_form("C1", "K", &biz)).await;
	let order = app.memory.find_order("JD01", None).await.unwrap().unwrap();
	app.memory
		.transition(order.id, OrderStatus::Done, &[OrderStatus::Pending])
		.await
		.unwrap();

	let query_biz = json!({"orderId": "JD01"});
	let form = game_push_form("C1", "K", &query_biz);
	let (status, reply) = post_form(&app.router, "/api/game/query", &form).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(reply["retCode"], "100");
	assert_eq!(reply["retMessage"], "查询成功");
	let data = bridge_sign::decode_envelope(reply["data"].as_str().unwrap()).unwrap();
	assert_eq!(data, json!({"orderStatus": 1}));
}

#[tokio::test]
async fn card_query_includes_cards_once_done() {
	let app = test_app().await;
	app.memory.insert_shop(&game_shop()).await.unwrap();

	let biz = json!({"orderId": "JDC1", "skuId": "S1", "totalPrice": "2.00", "buyNum": "2"});
	post_form(&app.router, "/api/game/card", &game_push_form("C1", "K", &biz)).await;
	let order = app.memory.find_order("JDC1", None).await.unwrap().unwrap();
	assert_eq!(order.order_type, OrderType::Card);

	// Pending card order reads as "processing" (1).
	let (_, reply) = get_path(
		&app.router,
		&format!("/api/game/card-query?orderId={}", "JDC1"),
	)
	.await;
	let data = bridge_sign::decode_envelope(reply["data"].as_str().unwrap()).unwrap();
	assert_eq!(data["orderStatus"], 1);

	app.memory
		.set_card_info(order.id, &[CardCode::new("N1", "P1"), CardCode::new("N2", "P2")])
		.await
		.unwrap();
	app.memory
		.transition(order.id, OrderStatus::Done, &[OrderStatus::Pending])
		.await
		.unwrap();

	let (_, reply) = get_path(
		&app.router,
		&format!("/api/game/card-query?orderId={}", "JDC1"),
	)
	.await;
	let data = bridge_sign::decode_envelope(reply["data"].as_str().unwrap()).unwrap();
	assert_eq!(data["orderStatus"], 0);
	assert_eq!(data["cardInfos"][0], json!({"cardNo": "N1", "cardPass": "P1"}));
	assert_eq!(data["cardInfos"][1]["cardNo"], "N2");
}

#[tokio::test]
async fn unknown_order_query_is_an_error_envelope() {
	let app = test_app().await;
	app.memory.insert_shop(&game_shop()).await.unwrap();

	let (_, reply) = get_path(&app.router, "/api/game/query?orderId=NOPE").await;
	assert_eq!(reply["retCode"], "200");
	assert_eq!(reply["retMessage"], "订单不存在");
}

#[tokio::test]
async fn query_endpoints_are_not_api_logged() {
	let app = test_app().await;
	app.memory.insert_shop(&game_shop()).await.unwrap();

	get_path(&app.router, "/api/game/query?orderId=NOPE").await;
	assert_eq!(app.memory.api_log_count().await, 0);

	let biz = json!({"orderId": "JD01", "totalPrice": "1.00"});
	post_form(&app.router, "/api/game/direct", &game_push_form("C1", "K", &biz)).await;
	assert_eq!(app.memory.api_log_count().await, 1);
}

#[tokio::test]
async fn missing_customer_id_falls_back_to_first_enabled_game_shop() {
	let app = test_app().await;
	let mut shop = game_shop();
	shop.game_md5_secret = None;
	app.memory.insert_shop(&shop).await.unwrap();

	let mut form = std::collections::HashMap::new();
	form.insert(
		"data".to_string(),
		bridge_sign::encode_envelope(&json!({"orderId": "JDF1", "totalPrice": "1.00"})),
	);
	let (_, reply) = post_form(&app.router, "/api/game/direct", &form).await;
	assert_eq!(reply["retCode"], "100");

	let order = app.memory.find_order("JDF1", None).await.unwrap().unwrap();
	assert_eq!(order.shop_type, ShopType::Game);
}
