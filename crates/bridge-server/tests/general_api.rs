//! General channel endpoint tests.

mod common;

use std::collections::HashMap;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bridge_sign::{aes_ecb_decrypt, general_sign, verify_general_sign};
use bridge_store::StoreInterface;
use bridge_types::{EventResult, EventType, NotifyStatus, OrderStatus, OrderType};
use common::*;

fn distill_form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
	pairs
		.iter()
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.collect()
}

async fn mount_inventory_cards(server: &MockServer, cards: serde_json::Value) {
	Mock::given(method("POST"))
		.and(path("/acpr/CardPwd/HandPick"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"IsSuccess": true,
			"Data": { "CardPwdArr": cards }
		})))
		.mount(server)
		.await;
}

#[tokio::test]
async fn distill_card_order_auto_fulfills_end_to_end() {
	let inventory = MockServer::start().await;
	let platform = MockServer::start().await;
	mount_inventory_cards(
		&inventory,
		json!([{"c": "N1", "p": "P1"}, {"c": "N2", "p": "P2"}]),
	)
	.await;
	Mock::given(method("POST"))
		.and(path("/produce/result"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "0"})))
		.mount(&platform)
		.await;

	let app = test_app().await;
	let mut shop = general_shop();
	shop.general_aes_secret = Some("k".repeat(32));
	with_inventory(&mut shop, &inventory.uri());
	let shop_id = app.memory.insert_shop(&shop).await.unwrap();
	app.memory
		.insert_product(&auto_product(shop_id, "SKU1", "7"))
		.await
		.unwrap();

	let form = distill_form(&[
		("vendorId", "V1"),
		("jdOrderNo", "J2"),
		("bizType", "2"),
		("totalPrice", "200"),
		("quantity", "2"),
		("wareNo", "SKU1"),
		("notifyUrl", &platform.uri()),
	]);
	let (status, reply) = post_form(&app.router, "/api/general/distill", &form).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(reply["produceStatus"], 3);
	assert_eq!(reply["code"], "JDO_201");

	let order = app.memory.find_order("J2", None).await.unwrap().unwrap();
	assert_eq!(order.order_status, OrderStatus::Done);
	assert_eq!(order.order_type, OrderType::Card);
	assert_eq!(order.notify_status, NotifyStatus::Ok);
	assert_eq!(order.amount, 200);
	let cards = order.cards();
	assert_eq!(cards.len(), 2);
	assert_eq!(cards[1].card_no, "N2");

	// Both the fetch and the delivery left success events.
	let events = app.memory.events_for_order(order.id).await.unwrap();
	let kinds: Vec<_> = events.iter().map(|e| (e.event_type, e.result)).collect();
	assert!(kinds.contains(&(EventType::InventoryFetch, EventResult::Success)));
	assert!(kinds.contains(&(EventType::AutoDeliver, EventResult::Success)));

	// The platform callback carried the encrypted card payload.
	let requests = platform.received_requests().await.unwrap();
	assert_eq!(requests.len(), 1);
	let body: HashMap<String, String> = url::form_urlencoded::parse(&requests[0].body)
		.into_owned()
		.collect();
	assert_eq!(body.get("produceStatus").map(String::as_str), Some("1"));
	assert_eq!(body.get("jdOrderNo").map(String::as_str), Some("J2"));
	let product = aes_ecb_decrypt(body.get("product").unwrap(), &"k".repeat(32)).unwrap();
	let decoded: serde_json::Value = serde_json::from_str(&product).unwrap();
	assert_eq!(decoded[0]["cardNumber"], "N1");
	assert_eq!(decoded[0]["password"], "P1");
	assert_eq!(decoded[0]["expiryDate"], "2099-12-31");
}

#[tokio::test]
async fn inventory_shortfall_keeps_order_pending_without_cards() {
	let inventory = MockServer::start().await;
	let platform = MockServer::start().await;
	mount_inventory_cards(&inventory, json!([{"c": "N1", "p": "P1"}])).await;

	let app = test_app().await;
	let mut shop = general_shop();
	with_inventory(&mut shop, &inventory.uri());
	let shop_id = app.memory.insert_shop(&shop).await.unwrap();
	app.memory
		.insert_product(&auto_product(shop_id, "SKU1", "7"))
		.await
		.unwrap();

	let form = distill_form(&[
		("vendorId", "V1"),
		("jdOrderNo", "J3"),
		("bizType", "2"),
		("totalPrice", "200"),
		("quantity", "2"),
		("wareNo", "SKU1"),
		("notifyUrl", &platform.uri()),
	]);
	let (_, reply) = post_form(&app.router, "/api/general/distill", &form).await;
	assert_eq!(reply["code"], "JDO_201");

	let order = app.memory.find_order("J3", None).await.unwrap().unwrap();
	assert_eq!(order.order_status, OrderStatus::Pending);
	assert!(order.card_info.is_none());
	assert!(platform.received_requests().await.unwrap().is_empty());

	let events = app.memory.events_for_order(order.id).await.unwrap();
	assert!(events
		.iter()
		.any(|e| e.event_type == EventType::InventoryFetch && e.result == EventResult::Failed));
}

#[tokio::test]
async fn duplicate_distill_returns_original_order_no_resigned() {
	let app = test_app().await;
	let mut shop = general_shop();
	shop.general_md5_secret = Some("K".to_string());
	app.memory.insert_shop(&shop).await.unwrap();

	let mut form = distill_form(&[
		("vendorId", "V1"),
		("jdOrderNo", "J4"),
		("bizType", "1"),
		("totalPrice", "100"),
		("quantity", "1"),
	]);
	form.insert("signType".to_string(), "MD5".to_string());
	let sign = general_sign(&form, "K");
	form.insert("sign".to_string(), sign);

	let (_, first) = post_form(&app.router, "/api/general/distill", &form).await;
	let agent_order_no = first["agentOrderNo"].as_str().unwrap().to_string();

	let (status, second) = post_form(&app.router, "/api/general/distill", &form).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(second["produceStatus"], 3);
	assert_eq!(second["code"], "JDO_201");
	assert_eq!(second["agentOrderNo"], agent_order_no.as_str());

	// The duplicate reply is itself signed.
	let reply_params: HashMap<String, String> = second
		.as_object()
		.unwrap()
		.iter()
		.map(|(k, v)| {
			let value = match v {
				serde_json::Value::String(s) => s.clone(),
				other => other.to_string(),
			};
			(k.clone(), value)
		})
		.collect();
	assert!(verify_general_sign(&reply_params, "K"));

	// Still exactly one order row.
	let events_order = app.memory.find_order("J4", None).await.unwrap().unwrap();
	let created: Vec<_> = app
		.memory
		.events_for_order(events_order.id)
		.await
		.unwrap()
		.into_iter()
		.filter(|e| e.event_type == EventType::OrderCreated)
		.collect();
	assert_eq!(created.len(), 1);
}

#[tokio::test]
async fn bad_signature_is_refused_with_protocol_envelope() {
	let app = test_app().await;
	let mut shop = general_shop();
	shop.general_md5_secret = Some("K".to_string());
	app.memory.insert_shop(&shop).await.unwrap();

	let mut form = distill_form(&[
		("vendorId", "V1"),
		("jdOrderNo", "J5"),
		("bizType", "1"),
		("totalPrice", "100"),
	]);
	form.insert("sign".to_string(), "bad".to_string());

	let (status, reply) = post_form(&app.router, "/api/general/distill", &form).await;
	assert_eq!(status, StatusCode::FORBIDDEN);
	assert_eq!(reply["produceStatus"], 2);
	assert_eq!(reply["code"], "JDO_304");
	assert_eq!(reply["jdOrderNo"], "J5");
	assert_eq!(reply["agentOrderNo"], "");

	assert!(app.memory.find_order("J5", None).await.unwrap().is_none());
}

#[tokio::test]
async fn query_reflects_lifecycle_and_ships_encrypted_cards() {
	let app = test_app().await;
	let mut shop = general_shop();
	shop.general_aes_secret = Some("k".repeat(32));
	app.memory.insert_shop(&shop).await.unwrap();

	let form = distill_form(&[
		("vendorId", "V1"),
		("jdOrderNo", "J6"),
		("bizType", "2"),
		("totalPrice", "200"),
		("quantity", "2"),
		("wareNo", "SKU1"),
	]);
	post_form(&app.router, "/api/general/distill", &form).await;

	// Open order polls as "producing".
	let (_, reply) = get_path(&app.router, "/api/general/query?jdOrderNo=J6").await;
	assert_eq!(reply["produceStatus"], 3);
	assert_eq!(reply["code"], "JDO_201");
	assert!(reply.get("product").is_none());

	let order = app.memory.find_order("J6", None).await.unwrap().unwrap();
	app.memory
		.set_card_info(
			order.id,
			&[
				bridge_types::CardCode::new("N1", "P1"),
				bridge_types::CardCode::new("N2", "P2"),
			],
		)
		.await
		.unwrap();
	app.memory
		.transition(order.id, OrderStatus::Done, &[OrderStatus::Pending])
		.await
		.unwrap();

	let (_, reply) = get_path(&app.router, "/api/general/query?jdOrderNo=J6").await;
	assert_eq!(reply["produceStatus"], 1);
	assert_eq!(reply["code"], "JDO_200");
	let product = aes_ecb_decrypt(reply["product"].as_str().unwrap(), &"k".repeat(32)).unwrap();
	let cards: serde_json::Value = serde_json::from_str(&product).unwrap();
	assert_eq!(cards[0]["cardNumber"], "N1");

	// Refunded orders poll as failed.
	app.memory
		.transition(order.id, OrderStatus::Refunded, &[OrderStatus::Done])
		.await
		.unwrap();
	let (_, reply) = get_path(&app.router, "/api/general/query?jdOrderNo=J6").await;
	assert_eq!(reply["produceStatus"], 2);
	assert_eq!(reply["code"], "JDO_302");
}

#[tokio::test]
async fn unknown_vendor_is_rejected() {
	let app = test_app().await;
	app.memory.insert_shop(&general_shop()).await.unwrap();

	let form = distill_form(&[("vendorId", "NOPE"), ("jdOrderNo", "J7"), ("totalPrice", "1")]);
	let (status, reply) = post_form(&app.router, "/api/general/distill", &form).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(reply["success"], false);
}

#[tokio::test]
async fn garbage_amount_is_a_validation_error() {
	let app = test_app().await;
	app.memory.insert_shop(&general_shop()).await.unwrap();

	let form = distill_form(&[
		("vendorId", "V1"),
		("jdOrderNo", "J8"),
		("totalPrice", "12.5x"),
	]);
	let (status, reply) = post_form(&app.router, "/api/general/distill", &form).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(reply["message"], "金额格式错误");
	assert!(app.memory.find_order("J8", None).await.unwrap().is_none());
}
