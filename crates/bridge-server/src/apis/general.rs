//! General channel endpoints.
//!
//! The distill endpoint ingests both direct and card orders from a flat
//! signed form; replies are JSON carrying `produceStatus`/`code` and are
//! themselves signed with the shop's secret. Card codes in query
//! replies travel AES-ECB encrypted in the `product` field.

use std::collections::HashMap;

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};

use crate::server::AppState;
use bridge_sign::{aes_ecb_encrypt, general_sign, verify_general_sign};
use bridge_types::{
	cards_to_general_json, generate_order_no, now_utc, wire_timestamp, EventDraft, EventResult,
	EventType, FormMap, Order, OrderDraft, OrderStatus, OrderType, Shop, ShopType,
};

const VENDOR_ALIASES: &[&str] = &["vendorId", "venderId", "vendor_id"];
const JD_ORDER_ALIASES: &[&str] = &["jdOrderNo", "jdOrderId", "jd_order_no", "orderId"];

type Reply = (StatusCode, Json<Value>);

fn plain_error(status: StatusCode, message: &str) -> Reply {
	(
		status,
		Json(json!({ "success": false, "code": 1, "message": message })),
	)
}

/// Maps internal status to `(produceStatus, code)`.
fn query_status(status: OrderStatus) -> (u8, &'static str) {
	match status {
		OrderStatus::Pending | OrderStatus::Processing => (3, "JDO_201"),
		OrderStatus::Done => (1, "JDO_200"),
		OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Error => (2, "JDO_302"),
	}
}

/// Builds the signed protocol reply.
fn signed_reply(
	shop: Option<&Shop>,
	jd_order_no: &str,
	agent_order_no: &str,
	produce_status: u8,
	code: &str,
	product: Option<String>,
) -> Json<Value> {
	let timestamp = wire_timestamp();

	let mut sign_params: HashMap<String, String> = HashMap::new();
	sign_params.insert("jdOrderNo".to_string(), jd_order_no.to_string());
	sign_params.insert("agentOrderNo".to_string(), agent_order_no.to_string());
	sign_params.insert("produceStatus".to_string(), produce_status.to_string());
	sign_params.insert("code".to_string(), code.to_string());
	sign_params.insert("signType".to_string(), "MD5".to_string());
	sign_params.insert("timestamp".to_string(), timestamp.clone());
	if let Some(product) = &product {
		sign_params.insert("product".to_string(), product.clone());
	}

	let mut reply = json!({
		"jdOrderNo": jd_order_no,
		"agentOrderNo": agent_order_no,
		"produceStatus": produce_status,
		"code": code,
		"signType": "MD5",
		"timestamp": timestamp,
	});
	if let Some(product) = product {
		reply["product"] = Value::String(product);
	}
	if let Some(secret) = shop
		.and_then(|s| s.general_md5_secret.as_deref())
		.filter(|s| !s.is_empty())
	{
		reply["sign"] = Value::String(general_sign(&sign_params, secret));
	}
	Json(reply)
}

pub async fn distill(
	State(state): State<AppState>,
	Form(params): Form<HashMap<String, String>>,
) -> Reply {
	let raw = FormMap::new(params);
	if raw.is_empty() {
		return plain_error(StatusCode::BAD_REQUEST, "无效请求数据");
	}

	let vendor_id = raw.get_any(VENDOR_ALIASES);
	let shop_code = raw.get_any(&["shop_code"]);
	let shop = match state
		.store
		.resolve_shop(ShopType::General, vendor_id, shop_code)
		.await
	{
		Ok(Some(shop)) => shop,
		Ok(None) => return plain_error(StatusCode::BAD_REQUEST, "店铺不存在或已禁用"),
		Err(e) => {
			tracing::error!("shop lookup failed: {}", e);
			return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "系统繁忙");
		}
	};

	let jd_order_no = raw.get_any_string(JD_ORDER_ALIASES).unwrap_or_default();

	if let Some(secret) = shop.general_md5_secret.as_deref().filter(|s| !s.is_empty()) {
		if !verify_general_sign(raw.as_map(), secret) {
			tracing::warn!(shop_code = %shop.shop_code, "general push signature mismatch");
			return (
				StatusCode::FORBIDDEN,
				Json(json!({
					"jdOrderNo": jd_order_no,
					"agentOrderNo": "",
					"produceStatus": 2,
					"code": "JDO_304",
					"signType": "MD5",
					"timestamp": wire_timestamp(),
				})),
			);
		}
	}

	if shop.is_expired(now_utc()) {
		return plain_error(StatusCode::FORBIDDEN, "店铺已到期");
	}

	if jd_order_no.is_empty() {
		return plain_error(StatusCode::BAD_REQUEST, "缺少订单号");
	}

	// bizType: 1 = direct top-up, 2 = card codes.
	let order_type = match raw.get_any(&["bizType", "biz_type", "order_type"]) {
		Some("2") => OrderType::Card,
		_ => OrderType::Direct,
	};

	// General pushes already price in fen; absent means zero, garbage is
	// a validation error.
	let amount_aliases = &["totalPrice", "price", "amount", "jdPrice"];
	let amount = if raw.get_any(amount_aliases).is_none() {
		0
	} else {
		match raw.parse_fen("totalPrice", amount_aliases) {
			Ok(v) => v,
			Err(e) => {
				tracing::warn!(%jd_order_no, "general push with invalid amount: {}", e);
				return plain_error(StatusCode::BAD_REQUEST, "金额格式错误");
			}
		}
	};
	let quantity = match raw.parse_quantity("quantity", &["quantity", "num"]) {
		Ok(v) => v,
		Err(e) => {
			tracing::warn!(%jd_order_no, "general push with invalid quantity: {}", e);
			return plain_error(StatusCode::BAD_REQUEST, "数量格式错误");
		}
	};

	let draft = OrderDraft {
		order_no: generate_order_no(),
		jd_order_no: jd_order_no.clone(),
		shop_id: shop.id,
		shop_type: ShopType::General,
		order_type,
		sku_id: raw.get_any_string(&["wareNo", "skuId", "sku_id"]),
		product_info: raw.get_any_string(&["skuName", "productInfo", "product_info"]),
		amount,
		quantity,
		produce_account: raw.get_any_string(&[
			"produceAccount",
			"chargeAccount",
			"produce_account",
			"account",
		]),
		notify_url: raw.get_any_string(&["notifyUrl", "notify_url"]),
	};

	let (order, created) = match state.store.backend().insert_order_if_absent(&draft).await {
		Ok(v) => v,
		Err(e) => {
			tracing::error!(%jd_order_no, "order insert failed: {}", e);
			return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "系统繁忙");
		}
	};
	if !created {
		// Idempotency hit: answer with the original internal order number.
		return (
			StatusCode::OK,
			signed_reply(Some(&shop), &jd_order_no, &order.order_no, 3, "JDO_201", None),
		);
	}

	let type_label = match order_type {
		OrderType::Direct => "直充",
		OrderType::Card => "卡密",
	};
	state
		.store
		.append_event_best_effort(
			&order,
			EventDraft::new(
				EventType::OrderCreated,
				format!(
					"通用交易订单创建，京东订单号：{}，类型：{}，SKU：{}",
					jd_order_no,
					type_label,
					order.sku_id.as_deref().unwrap_or("无")
				),
				EventResult::Info,
			),
		)
		.await;

	if order_type == OrderType::Card {
		if let Err(e) = state.engine.auto_card_fulfill(&order, &shop).await {
			tracing::error!(order_no = %order.order_no, "auto card fulfill failed: {}", e);
		}
	}

	state.notifier.dispatch(&order, &shop);

	(
		StatusCode::OK,
		signed_reply(Some(&shop), &jd_order_no, &order.order_no, 3, "JDO_201", None),
	)
}

pub async fn query_get(
	State(state): State<AppState>,
	Query(params): Query<HashMap<String, String>>,
) -> Reply {
	query(state, FormMap::new(params)).await
}

pub async fn query_post(
	State(state): State<AppState>,
	Form(params): Form<HashMap<String, String>>,
) -> Reply {
	query(state, FormMap::new(params)).await
}

async fn query(state: AppState, params: FormMap) -> Reply {
	if params.is_empty() {
		return plain_error(StatusCode::BAD_REQUEST, "无效请求数据");
	}
	let Some(jd_order_no) = params.get_any_string(JD_ORDER_ALIASES) else {
		return plain_error(StatusCode::BAD_REQUEST, "缺少订单号");
	};

	let order = match state.store.backend().find_order(&jd_order_no, None).await {
		Ok(Some(order)) => order,
		Ok(None) => return plain_error(StatusCode::OK, "订单不存在"),
		Err(e) => {
			tracing::error!(%jd_order_no, "order lookup failed: {}", e);
			return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "系统繁忙");
		}
	};

	let shop = state.store.backend().shop_by_id(order.shop_id).await.ok();
	let (produce_status, code) = query_status(order.order_status);
	let product = query_product_field(shop.as_ref(), &order);

	(
		StatusCode::OK,
		signed_reply(
			shop.as_ref(),
			&order.jd_order_no,
			&order.order_no,
			produce_status,
			code,
			product,
		),
	)
}

/// The `product` field of a query reply: the delivered cards, encrypted
/// when the shop carries an AES secret.
fn query_product_field(shop: Option<&Shop>, order: &Order) -> Option<String> {
	if order.order_status != OrderStatus::Done || order.order_type != OrderType::Card {
		return None;
	}
	let cards = order.cards();
	if cards.is_empty() {
		return None;
	}
	let payload = cards_to_general_json(&cards);
	Some(
		match shop
			.and_then(|s| s.general_aes_secret.as_deref())
			.filter(|s| !s.is_empty())
		{
			Some(secret) => aes_ecb_encrypt(&payload, secret),
			None => payload,
		},
	)
}
