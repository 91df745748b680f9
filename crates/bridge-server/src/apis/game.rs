//! Game channel endpoints.
//!
//! Order pushes arrive as a signed outer form `{customerId, data,
//! timestamp, sign}` whose `data` field is the base64-JSON business
//! envelope. Replies are always the channel's JSON envelope
//! `{retCode, retMessage, data?}`: `"100"` for accepted, `"200"` for
//! every error, with HTTP status 200 throughout.

use std::collections::HashMap;

use axum::extract::{Form, Query, State};
use axum::response::Json;
use serde_json::{json, Value};

use crate::apis::{json_field, json_price_fen, json_quantity};
use crate::server::AppState;
use bridge_sign::{decode_envelope, encode_envelope, verify_game_sign};
use bridge_types::{
	generate_order_no, now_utc, EventDraft, EventResult, EventType, FormMap, Order, OrderDraft,
	OrderStatus, OrderType, ShopType,
};

fn success(message: &str) -> Json<Value> {
	Json(json!({ "retCode": "100", "retMessage": message }))
}

fn error(message: &str) -> Json<Value> {
	Json(json!({ "retCode": "200", "retMessage": message }))
}

/// Maps internal status to the direct-query `orderStatus`.
///
/// 0 = recharging, 1 = success, 2 = failure.
fn direct_query_status(status: OrderStatus) -> u8 {
	match status {
		OrderStatus::Pending | OrderStatus::Processing => 0,
		OrderStatus::Done => 1,
		OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Error => 2,
	}
}

/// Maps internal status to the card-query `orderStatus`.
///
/// 1 = processing, 0 = delivered, 2 = failure.
fn card_query_status(status: OrderStatus) -> u8 {
	match status {
		OrderStatus::Pending | OrderStatus::Processing => 1,
		OrderStatus::Done => 0,
		OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Error => 2,
	}
}

pub async fn direct_push(
	State(state): State<AppState>,
	Form(params): Form<HashMap<String, String>>,
) -> Json<Value> {
	push(state, FormMap::new(params), OrderType::Direct).await
}

pub async fn card_push(
	State(state): State<AppState>,
	Form(params): Form<HashMap<String, String>>,
) -> Json<Value> {
	push(state, FormMap::new(params), OrderType::Card).await
}

async fn push(state: AppState, raw: FormMap, order_type: OrderType) -> Json<Value> {
	if raw.is_empty() {
		return error("无效请求数据");
	}

	// The business object lives in the envelope; legacy clients send it flat.
	let biz: Value = match raw.get_any(&["data"]) {
		Some(data) => match decode_envelope(data) {
			Ok(value) => value,
			Err(e) => {
				tracing::warn!("game push envelope decode failed: {}", e);
				return error("数据解码失败");
			}
		},
		None => serde_json::to_value(raw.as_map()).unwrap_or_default(),
	};

	let customer_id = raw.get_any(&["customerId", "customer_id"]);
	let shop_code = raw.get_any(&["shop_code", "venderId", "vender_id"]);
	let shop = match state
		.store
		.resolve_shop(ShopType::Game, customer_id, shop_code)
		.await
	{
		Ok(Some(shop)) => shop,
		Ok(None) => {
			// Legacy clients omit customerId; route to the first enabled
			// game shop. Tenant selection is unauthenticated on this path.
			match state.store.backend().first_enabled_shop(ShopType::Game).await {
				Ok(Some(shop)) => {
					tracing::warn!(
						shop_code = %shop.shop_code,
						"game push without matching customerId, using first enabled game shop"
					);
					shop
				}
				Ok(None) => return error("店铺不存在或已禁用"),
				Err(e) => {
					tracing::error!("shop lookup failed: {}", e);
					return error("系统繁忙");
				}
			}
		}
		Err(e) => {
			tracing::error!("shop lookup failed: {}", e);
			return error("系统繁忙");
		}
	};

	if let Some(secret) = shop.game_md5_secret.as_deref().filter(|s| !s.is_empty()) {
		if !verify_game_sign(raw.as_map(), secret) {
			tracing::warn!(shop_code = %shop.shop_code, "game push signature mismatch");
			return error("签名验证失败");
		}
	}

	if shop.is_expired(now_utc()) {
		return error("店铺已到期");
	}

	let Some(jd_order_no) = json_field(&biz, &["orderId", "jdOrderId"]) else {
		return error("缺少订单号");
	};

	let amount = match json_price_fen(&biz, &["totalPrice", "price"]) {
		Some(Ok(fen)) => fen,
		Some(Err(raw)) => {
			tracing::warn!(%jd_order_no, "game push with invalid price: {:?}", raw);
			return error("金额格式错误");
		}
		None => 0,
	};
	let quantity = match json_quantity(&biz, &["buyNum", "num"], 1) {
		Ok(q) => q,
		Err(raw) => {
			tracing::warn!(%jd_order_no, "game push with invalid quantity: {:?}", raw);
			return error("数量格式错误");
		}
	};

	let sku_id = json_field(&biz, &["skuId"]);
	let brand_id = json_field(&biz, &["brandId"]).unwrap_or_default();
	let produce_account = json_field(&biz, &["gameAccount", "chargeAccount", "phoneNum"]);

	let draft = OrderDraft {
		order_no: generate_order_no(),
		jd_order_no: jd_order_no.clone(),
		shop_id: shop.id,
		shop_type: ShopType::Game,
		order_type,
		sku_id: sku_id.clone(),
		product_info: Some(format!(
			"SKU:{} Brand:{}",
			sku_id.as_deref().unwrap_or_default(),
			brand_id
		)),
		amount,
		quantity,
		produce_account,
		notify_url: None,
	};

	let (order, created) = match state.store.backend().insert_order_if_absent(&draft).await {
		Ok(v) => v,
		Err(e) => {
			tracing::error!(%jd_order_no, "order insert failed: {}", e);
			return error("系统繁忙");
		}
	};
	if !created {
		return success("订单已存在");
	}

	let desc = match order_type {
		OrderType::Direct => format!(
			"游戏点卡直充订单创建，京东订单号：{}，金额：{:.2}元，账号：{}",
			jd_order_no,
			order.amount as f64 / 100.0,
			order.produce_account.as_deref().unwrap_or("无")
		),
		OrderType::Card => format!(
			"游戏点卡卡密订单创建，京东订单号：{}，SKU：{}，数量：{}",
			jd_order_no,
			order.sku_id.as_deref().unwrap_or("无"),
			order.quantity
		),
	};
	state
		.store
		.append_event_best_effort(
			&order,
			EventDraft::new(EventType::OrderCreated, desc, EventResult::Info),
		)
		.await;

	if order_type == OrderType::Card {
		if let Err(e) = state.engine.auto_card_fulfill(&order, &shop).await {
			tracing::error!(order_no = %order.order_no, "auto card fulfill failed: {}", e);
		}
	}

	state.notifier.dispatch(&order, &shop);

	success("接收成功")
}

pub async fn direct_query_get(
	State(state): State<AppState>,
	Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
	query(state, FormMap::new(params), false).await
}

pub async fn direct_query_post(
	State(state): State<AppState>,
	Form(params): Form<HashMap<String, String>>,
) -> Json<Value> {
	query(state, FormMap::new(params), false).await
}

pub async fn card_query_get(
	State(state): State<AppState>,
	Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
	query(state, FormMap::new(params), true).await
}

pub async fn card_query_post(
	State(state): State<AppState>,
	Form(params): Form<HashMap<String, String>>,
) -> Json<Value> {
	query(state, FormMap::new(params), true).await
}

async fn query(state: AppState, params: FormMap, card: bool) -> Json<Value> {
	if params.is_empty() {
		return error("无效请求数据");
	}

	let jd_order_no = match params.get_any(&["data"]) {
		Some(data) => match decode_envelope(data) {
			Ok(biz) => json_field(&biz, &["orderId", "jdOrderId"]),
			Err(_) => None,
		},
		None => params.get_any_string(&["orderId", "jdOrderId"]),
	};
	let Some(jd_order_no) = jd_order_no else {
		return error("缺少订单号");
	};

	let order = match state.store.backend().find_order(&jd_order_no, None).await {
		Ok(Some(order)) => order,
		Ok(None) => return error("订单不存在"),
		Err(e) => {
			tracing::error!(%jd_order_no, "order lookup failed: {}", e);
			return error("系统繁忙");
		}
	};

	let data = if card {
		card_query_data(&order)
	} else {
		json!({ "orderStatus": direct_query_status(order.order_status) })
	};

	Json(json!({
		"retCode": "100",
		"retMessage": "查询成功",
		"data": encode_envelope(&data),
	}))
}

fn card_query_data(order: &Order) -> Value {
	let mut data = json!({ "orderStatus": card_query_status(order.order_status) });
	if order.order_status == OrderStatus::Done {
		let cards: Vec<Value> = order.cards().iter().map(|c| c.to_game_query()).collect();
		if !cards.is_empty() {
			data["cardInfos"] = Value::Array(cards);
		}
	}
	data
}
