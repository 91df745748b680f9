//! Fulfillment engine for the order bridge.
//!
//! The engine is the only component that mutates an order after
//! ingestion. It is invoked from the inbound handlers (automatic card
//! delivery) and from operator actions (manual success, manual deliver,
//! refund, debug overrides). Two rules hold for every path:
//!
//! 1. Card data is persisted **before** the platform callback goes out,
//!    so a crash between the two leaves the order recoverable by a
//!    manual action instead of losing paid-for codes.
//! 2. Every state change and every callback attempt appends at least
//!    one order event describing the outcome.

use std::sync::Arc;

use thiserror::Error;

use bridge_callback::CallbackClient;
use bridge_inventory::{InventoryError, InventoryService};
use bridge_store::{StoreError, StoreService};
use bridge_types::{
	CardCode, EventDraft, EventResult, EventType, NotifyStatus, Order, OrderStatus, OrderType,
	Shop, ShopType,
};

/// Errors surfaced to engine callers.
///
/// Automatic fulfillment absorbs its business failures into order
/// events; manual operator actions surface them so the operator sees
/// the reason.
#[derive(Debug, Error)]
pub enum EngineError {
	/// A precondition of the action does not hold.
	#[error("precondition failed: {0}")]
	Precondition(String),
	/// Operator input is invalid.
	#[error("validation failed: {0}")]
	Validation(String),
	/// The platform callback did not succeed.
	#[error("callback failed: {0}")]
	Callback(String),
	/// The store failed.
	#[error("store error: {0}")]
	Store(#[from] StoreError),
}

/// Statuses an engine action may start from.
const OPEN_STATES: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Processing];

/// The order fulfillment engine.
#[derive(Clone)]
pub struct FulfillmentEngine {
	store: Arc<StoreService>,
	callbacks: CallbackClient,
	/// Shared client for per-shop inventory dialects.
	http: reqwest::Client,
}

impl FulfillmentEngine {
	pub fn new(store: Arc<StoreService>, callbacks: CallbackClient, http: reqwest::Client) -> Self {
		Self {
			store,
			callbacks,
			http,
		}
	}

	/// Automatic card fulfillment after a card-order ingest.
	///
	/// Fetches codes from the shop's inventory service when an enabled
	/// auto-delivery product matches the order SKU, persists them, then
	/// reports delivery to the platform. Business failures (shortfall,
	/// callback rejection) are recorded as events and leave the order in
	/// an open state for an operator; only store failures propagate.
	/// Re-invocation on an already completed order is a no-op.
	pub async fn auto_card_fulfill(
		&self,
		order: &Order,
		shop: &Shop,
	) -> Result<Order, EngineError> {
		if order.order_status == OrderStatus::Done {
			return Ok(order.clone());
		}
		if order.order_type != OrderType::Card {
			return Err(EngineError::Precondition(
				"automatic card delivery requires a card order".to_string(),
			));
		}

		let Some(sku_id) = order.sku_id.as_deref().filter(|s| !s.is_empty()) else {
			return Ok(order.clone());
		};
		let Some(product) = self
			.store
			.backend()
			.find_auto_product(shop.id, sku_id)
			.await?
		else {
			return Ok(order.clone());
		};
		if !product.auto_delivers() || !shop.has_inventory_credentials() {
			return Ok(order.clone());
		}
		let card_type_id = product.card91_card_type_id.as_deref().unwrap_or_default();

		// Fetch codes; a shortfall stores nothing and keeps the order open.
		let cards = match self.fetch_cards(shop, card_type_id, order).await {
			Ok(cards) => cards,
			Err(reason) => {
				self.store
					.append_event_best_effort(
						order,
						EventDraft::new(
							EventType::InventoryFetch,
							format!("91卡券自动提卡：{}", reason),
							EventResult::Failed,
						),
					)
					.await;
				return Ok(self.store.backend().order_by_id(order.id).await?);
			}
		};

		self.store
			.append_event_best_effort(
				order,
				EventDraft::new(
					EventType::InventoryFetch,
					format!("91卡券自动提卡：成功提取{}张卡密", cards.len()),
					EventResult::Success,
				),
			)
			.await;

		// Cards are on disk before the platform hears about them.
		self.store.backend().set_card_info(order.id, &cards).await?;

		match self.deliver_cards(shop, order, &cards).await {
			Ok(()) => {
				let updated = self
					.store
					.backend()
					.transition(order.id, OrderStatus::Done, &OPEN_STATES)
					.await?;
				self.store
					.backend()
					.set_notify_status(order.id, NotifyStatus::Ok)
					.await?;
				self.store
					.append_event_best_effort(
						order,
						EventDraft::new(
							EventType::AutoDeliver,
							format!("91卡券自动发卡成功，共{}张", cards.len()),
							EventResult::Success,
						),
					)
					.await;
				tracing::info!(order_no = %order.order_no, "automatic card delivery complete");
				self.store
					.backend()
					.order_by_id(updated.id)
					.await
					.map_err(Into::into)
			}
			Err(reason) => {
				self.store
					.backend()
					.set_notify_status(order.id, NotifyStatus::Fail)
					.await?;
				self.store
					.append_event_best_effort(
						order,
						EventDraft::new(
							EventType::Error,
							format!("91卡券发卡回调失败：{}", reason),
							EventResult::Failed,
						),
					)
					.await;
				Ok(self.store.backend().order_by_id(order.id).await?)
			}
		}
	}

	/// Operator action: report a direct (top-up) order as fulfilled.
	pub async fn manual_direct_success(
		&self,
		order: &Order,
		shop: &Shop,
		operator: &str,
	) -> Result<Order, EngineError> {
		if order.order_type != OrderType::Direct {
			return Err(EngineError::Precondition(
				"direct success requires a direct order".to_string(),
			));
		}
		if !OPEN_STATES.contains(&order.order_status) {
			return Err(EngineError::Precondition(format!(
				"order is {:?}, expected an open state",
				order.order_status
			)));
		}

		let outcome = match order.shop_type {
			ShopType::Game => self.callbacks.game_direct_success(shop, order).await,
			ShopType::General => self.callbacks.general_success(shop, order).await,
		};

		match outcome {
			Ok(()) => {
				self.store
					.backend()
					.transition(order.id, OrderStatus::Done, &OPEN_STATES)
					.await?;
				self.store
					.backend()
					.set_notify_status(order.id, NotifyStatus::Ok)
					.await?;
				self.store
					.append_event_best_effort(
						order,
						EventDraft::new(
							EventType::DirectCharge,
							"直充发货成功，平台回调确认".to_string(),
							EventResult::Success,
						)
						.with_operator(operator),
					)
					.await;
				self.store
					.backend()
					.order_by_id(order.id)
					.await
					.map_err(Into::into)
			}
			Err(e) => self.record_callback_failure(order, operator, e).await,
		}
	}

	/// Operator action: deliver card codes by hand.
	///
	/// The card count must match the order quantity exactly.
	pub async fn manual_card_deliver(
		&self,
		order: &Order,
		shop: &Shop,
		cards: Vec<CardCode>,
		operator: &str,
	) -> Result<Order, EngineError> {
		if order.order_type != OrderType::Card {
			return Err(EngineError::Precondition(
				"card delivery requires a card order".to_string(),
			));
		}
		if !OPEN_STATES.contains(&order.order_status) {
			return Err(EngineError::Precondition(format!(
				"order is {:?}, expected an open state",
				order.order_status
			)));
		}
		if cards.len() as i64 != order.quantity {
			return Err(EngineError::Validation(format!(
				"card count {} does not match order quantity {}",
				cards.len(),
				order.quantity
			)));
		}

		self.store.backend().set_card_info(order.id, &cards).await?;

		let outcome = self.deliver_cards(shop, order, &cards).await;
		match outcome {
			Ok(()) => {
				self.store
					.backend()
					.transition(order.id, OrderStatus::Done, &OPEN_STATES)
					.await?;
				self.store
					.backend()
					.set_notify_status(order.id, NotifyStatus::Ok)
					.await?;
				self.store
					.append_event_best_effort(
						order,
						EventDraft::new(
							EventType::ManualDeliver,
							format!("手动发卡成功，共{}张", cards.len()),
							EventResult::Success,
						)
						.with_operator(operator),
					)
					.await;
				self.store
					.backend()
					.order_by_id(order.id)
					.await
					.map_err(Into::into)
			}
			Err(reason) => {
				self.record_callback_failure(order, operator, CallbackFailure(reason))
					.await
			}
		}
	}

	/// Operator action: refund an order.
	pub async fn manual_refund(
		&self,
		order: &Order,
		shop: &Shop,
		operator: &str,
	) -> Result<Order, EngineError> {
		if matches!(
			order.order_status,
			OrderStatus::Refunded | OrderStatus::Cancelled
		) {
			return Err(EngineError::Precondition(format!(
				"order is already {:?}",
				order.order_status
			)));
		}

		let outcome = match order.shop_type {
			ShopType::Game => self.callbacks.game_refund(shop, order).await,
			ShopType::General => self.callbacks.general_refund(shop, order).await,
		};

		match outcome {
			Ok(()) => {
				self.store
					.backend()
					.transition(
						order.id,
						OrderStatus::Refunded,
						&[
							OrderStatus::Pending,
							OrderStatus::Processing,
							OrderStatus::Done,
							OrderStatus::Error,
						],
					)
					.await?;
				self.store
					.append_event_best_effort(
						order,
						EventDraft::new(
							EventType::NotifyRefund,
							"退款回调成功".to_string(),
							EventResult::Success,
						)
						.with_operator(operator),
					)
					.await;
				self.store
					.backend()
					.order_by_id(order.id)
					.await
					.map_err(Into::into)
			}
			Err(e) => self.record_callback_failure(order, operator, e).await,
		}
	}

	/// Admin override: force a status without any callback.
	pub async fn debug_set(
		&self,
		order: &Order,
		status: OrderStatus,
		operator: &str,
	) -> Result<Order, EngineError> {
		let all = [
			OrderStatus::Pending,
			OrderStatus::Processing,
			OrderStatus::Done,
			OrderStatus::Cancelled,
			OrderStatus::Refunded,
			OrderStatus::Error,
		];
		let updated = self.store.backend().transition(order.id, status, &all).await?;
		self.store
			.append_event_best_effort(
				order,
				EventDraft::new(
					EventType::StatusChanged,
					format!("调试操作：状态强制设为{:?}", status),
					EventResult::Info,
				)
				.with_operator(operator),
			)
			.await;
		Ok(updated)
	}

	async fn fetch_cards(
		&self,
		shop: &Shop,
		card_type_id: &str,
		order: &Order,
	) -> Result<Vec<CardCode>, String> {
		let inventory =
			InventoryService::for_shop(shop, self.http.clone()).map_err(|e| e.to_string())?;
		let quantity = order.quantity.max(0) as usize;
		inventory
			.fetch_exact(card_type_id, quantity, &order.order_no)
			.await
			.map_err(|e| match e {
				InventoryError::Shortfall { requested, received } => {
					format!("卡密不足，需{}张，只取到{}张", requested, received)
				}
				other => other.to_string(),
			})
	}

	async fn deliver_cards(
		&self,
		shop: &Shop,
		order: &Order,
		cards: &[CardCode],
	) -> Result<(), String> {
		let outcome = match order.shop_type {
			ShopType::Game => self.callbacks.game_card_deliver(shop, order, cards).await,
			ShopType::General => {
				self.callbacks.general_card_deliver(shop, order, cards).await
			}
		};
		outcome.map_err(|e| e.to_string())
	}

	async fn record_callback_failure(
		&self,
		order: &Order,
		operator: &str,
		error: impl std::fmt::Display,
	) -> Result<Order, EngineError> {
		self.store
			.backend()
			.set_notify_status(order.id, NotifyStatus::Fail)
			.await?;
		self.store
			.append_event_best_effort(
				order,
				EventDraft::new(
					EventType::Error,
					format!("平台回调失败：{}", error),
					EventResult::Failed,
				)
				.with_operator(operator),
			)
			.await;
		Err(EngineError::Callback(error.to_string()))
	}
}

/// Display adapter for a pre-rendered callback failure reason.
struct CallbackFailure(String);

impl std::fmt::Display for CallbackFailure {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}
