//! In-memory store backend.
//!
//! Keeps every table in process memory behind a read-write lock. Used by
//! unit and integration tests; provides the same idempotency and
//! transition semantics as the sqlite backend but no persistence.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{StoreError, StoreInterface};
use bridge_types::{
	cards_to_stored_json, now_utc, ApiLog, ApiLogDraft, CardCode, ConfigSchema, EventDraft,
	NotificationLog, NotificationLogDraft, NotifyStatus, Order, OrderDraft, OrderEvent,
	OrderStatus, Product, Schema, Shop, ShopType, ValidationError,
};

#[derive(Default)]
struct Inner {
	shops: Vec<Shop>,
	products: Vec<Product>,
	orders: Vec<Order>,
	events: Vec<OrderEvent>,
	notification_logs: Vec<NotificationLog>,
	api_logs: Vec<ApiLog>,
	users: Vec<(String, String)>,
	next_id: i64,
}

impl Inner {
	fn next(&mut self) -> i64 {
		self.next_id += 1;
		self.next_id
	}
}

/// In-memory store implementation.
///
/// Clones share the same underlying tables, so a test can keep a handle
/// for assertions after boxing another into the service.
#[derive(Clone)]
pub struct MemoryStore {
	inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(RwLock::new(Inner::default())),
		}
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StoreInterface for MemoryStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStoreSchema)
	}

	async fn init_schema(&self) -> Result<(), StoreError> {
		Ok(())
	}

	async fn ensure_admin_user(&self, username: &str, password: &str) -> Result<(), StoreError> {
		let mut inner = self.inner.write().await;
		if !inner.users.iter().any(|(u, _)| u == username) {
			inner.users.push((username.to_string(), password.to_string()));
		}
		Ok(())
	}

	async fn insert_shop(&self, shop: &Shop) -> Result<i64, StoreError> {
		let mut inner = self.inner.write().await;
		if inner.shops.iter().any(|s| s.shop_code == shop.shop_code) {
			return Err(StoreError::Backend(format!(
				"shop code '{}' already exists",
				shop.shop_code
			)));
		}
		let id = inner.next();
		let mut stored = shop.clone();
		stored.id = id;
		inner.shops.push(stored);
		Ok(id)
	}

	async fn shop_by_id(&self, id: i64) -> Result<Shop, StoreError> {
		let inner = self.inner.read().await;
		inner
			.shops
			.iter()
			.find(|s| s.id == id)
			.cloned()
			.ok_or(StoreError::NotFound)
	}

	async fn find_shop_by_customer_id(
		&self,
		customer_id: &str,
	) -> Result<Option<Shop>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner
			.shops
			.iter()
			.find(|s| {
				s.is_enabled && s.game_customer_id.as_deref() == Some(customer_id)
			})
			.cloned())
	}

	async fn find_shop_by_vendor_id(&self, vendor_id: &str) -> Result<Option<Shop>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner
			.shops
			.iter()
			.find(|s| {
				s.is_enabled && s.general_vendor_id.as_deref() == Some(vendor_id)
			})
			.cloned())
	}

	async fn find_shop_by_code(&self, shop_code: &str) -> Result<Option<Shop>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner
			.shops
			.iter()
			.find(|s| s.is_enabled && s.shop_code == shop_code)
			.cloned())
	}

	async fn first_enabled_shop(&self, shop_type: ShopType) -> Result<Option<Shop>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner
			.shops
			.iter()
			.find(|s| s.is_enabled && s.shop_type == shop_type)
			.cloned())
	}

	async fn insert_product(&self, product: &Product) -> Result<i64, StoreError> {
		let mut inner = self.inner.write().await;
		let id = inner.next();
		let mut stored = product.clone();
		stored.id = id;
		inner.products.push(stored);
		Ok(id)
	}

	async fn find_auto_product(
		&self,
		shop_id: i64,
		sku_id: &str,
	) -> Result<Option<Product>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner
			.products
			.iter()
			.find(|p| {
				p.shop_id == shop_id
					&& p.sku_id.as_deref() == Some(sku_id)
					&& p.is_enabled
					&& p.deliver_type == bridge_types::DeliverType::AutoCard
			})
			.cloned())
	}

	async fn insert_order_if_absent(
		&self,
		draft: &OrderDraft,
	) -> Result<(Order, bool), StoreError> {
		let mut inner = self.inner.write().await;
		if let Some(existing) = inner
			.orders
			.iter()
			.find(|o| o.jd_order_no == draft.jd_order_no && o.shop_id == draft.shop_id)
		{
			return Ok((existing.clone(), false));
		}
		let now = now_utc();
		let id = inner.next();
		let order = Order {
			id,
			order_no: draft.order_no.clone(),
			jd_order_no: draft.jd_order_no.clone(),
			shop_id: draft.shop_id,
			shop_type: draft.shop_type,
			order_type: draft.order_type,
			order_status: OrderStatus::Pending,
			sku_id: draft.sku_id.clone(),
			product_info: draft.product_info.clone(),
			amount: draft.amount,
			quantity: draft.quantity,
			produce_account: draft.produce_account.clone(),
			card_info: None,
			notify_url: draft.notify_url.clone(),
			notify_status: NotifyStatus::None,
			notify_time: None,
			notified: false,
			notify_send_time: None,
			pay_time: None,
			deliver_time: None,
			remark: None,
			create_time: now,
			update_time: now,
		};
		inner.orders.push(order.clone());
		Ok((order, true))
	}

	async fn order_by_id(&self, id: i64) -> Result<Order, StoreError> {
		let inner = self.inner.read().await;
		inner
			.orders
			.iter()
			.find(|o| o.id == id)
			.cloned()
			.ok_or(StoreError::NotFound)
	}

	async fn find_order(
		&self,
		jd_order_no: &str,
		shop_id: Option<i64>,
	) -> Result<Option<Order>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner
			.orders
			.iter()
			.find(|o| {
				o.jd_order_no == jd_order_no
					&& shop_id.map_or(true, |sid| o.shop_id == sid)
			})
			.cloned())
	}

	async fn transition(
		&self,
		order_id: i64,
		new_status: OrderStatus,
		expect_in: &[OrderStatus],
	) -> Result<Order, StoreError> {
		let mut inner = self.inner.write().await;
		let order = inner
			.orders
			.iter_mut()
			.find(|o| o.id == order_id)
			.ok_or(StoreError::NotFound)?;
		if !expect_in.contains(&order.order_status) {
			return Err(StoreError::InvalidTransition {
				order_id,
				current: order.order_status,
				expected: expect_in.to_vec(),
			});
		}
		order.order_status = new_status;
		order.update_time = now_utc();
		Ok(order.clone())
	}

	async fn set_card_info(&self, order_id: i64, cards: &[CardCode]) -> Result<(), StoreError> {
		let mut inner = self.inner.write().await;
		let order = inner
			.orders
			.iter_mut()
			.find(|o| o.id == order_id)
			.ok_or(StoreError::NotFound)?;
		order.card_info = Some(cards_to_stored_json(cards));
		let now = now_utc();
		order.deliver_time = Some(now);
		order.update_time = now;
		Ok(())
	}

	async fn set_notify_status(
		&self,
		order_id: i64,
		status: NotifyStatus,
	) -> Result<(), StoreError> {
		let mut inner = self.inner.write().await;
		let order = inner
			.orders
			.iter_mut()
			.find(|o| o.id == order_id)
			.ok_or(StoreError::NotFound)?;
		order.notify_status = status;
		let now = now_utc();
		order.notify_time = Some(now);
		order.update_time = now;
		Ok(())
	}

	async fn mark_notified(&self, order_id: i64) -> Result<(), StoreError> {
		let mut inner = self.inner.write().await;
		let order = inner
			.orders
			.iter_mut()
			.find(|o| o.id == order_id)
			.ok_or(StoreError::NotFound)?;
		order.notified = true;
		order.notify_send_time = Some(now_utc());
		Ok(())
	}

	async fn append_event(
		&self,
		order_id: i64,
		order_no: &str,
		event: &EventDraft,
	) -> Result<(), StoreError> {
		let mut inner = self.inner.write().await;
		let id = inner.next();
		let event_data = match &event.event_data {
			Some(v) => Some(
				serde_json::to_string(v)
					.map_err(|e| StoreError::Serialization(e.to_string()))?,
			),
			None => None,
		};
		inner.events.push(OrderEvent {
			id,
			order_id,
			order_no: order_no.to_string(),
			event_type: event.event_type,
			event_desc: event.event_desc.clone(),
			event_data,
			operator: event.operator.clone(),
			result: event.result,
			create_time: now_utc(),
		});
		Ok(())
	}

	async fn events_for_order(&self, order_id: i64) -> Result<Vec<OrderEvent>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner
			.events
			.iter()
			.filter(|e| e.order_id == order_id)
			.cloned()
			.collect())
	}

	async fn append_api_log(&self, draft: &ApiLogDraft) -> Result<(), StoreError> {
		let mut inner = self.inner.write().await;
		let id = inner.next();
		inner.api_logs.push(ApiLog {
			id,
			shop_id: draft.shop_id,
			api_type: draft.api_type.clone(),
			request_method: draft.request_method.clone(),
			request_url: draft.request_url.clone(),
			request_body: draft.request_body.clone(),
			response_status: draft.response_status,
			response_body: draft.response_body.clone(),
			ip_address: draft.ip_address.clone(),
			create_time: now_utc(),
		});
		Ok(())
	}

	async fn append_notification_log(
		&self,
		draft: &NotificationLogDraft,
	) -> Result<i64, StoreError> {
		let mut inner = self.inner.write().await;
		let id = inner.next();
		inner.notification_logs.push(NotificationLog {
			id,
			order_id: draft.order_id,
			shop_id: draft.shop_id,
			channel: draft.channel,
			success: draft.success,
			attempt: draft.attempt,
			request_data: draft.request_data.clone(),
			response_data: draft.response_data.clone(),
			error_message: draft.error_message.clone(),
			create_time: now_utc(),
		});
		Ok(id)
	}

	async fn notification_log_by_id(&self, id: i64) -> Result<NotificationLog, StoreError> {
		let inner = self.inner.read().await;
		inner
			.notification_logs
			.iter()
			.find(|l| l.id == id)
			.cloned()
			.ok_or(StoreError::NotFound)
	}
}

impl MemoryStore {
	/// Test helper: number of api log rows.
	pub async fn api_log_count(&self) -> usize {
		self.inner.read().await.api_logs.len()
	}

	/// Test helper: all notification log rows.
	pub async fn notification_logs(&self) -> Vec<NotificationLog> {
		self.inner.read().await.notification_logs.clone()
	}

	/// Test helper: the most recent api log row.
	pub async fn last_api_log(&self) -> Option<ApiLog> {
		self.inner.read().await.api_logs.last().cloned()
	}
}

/// Configuration schema for MemoryStore.
pub struct MemoryStoreSchema;

impl ConfigSchema for MemoryStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// The memory store has no required configuration.
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory store from configuration.
pub fn create_store(config: &toml::Value) -> Result<Box<dyn StoreInterface>, StoreError> {
	MemoryStoreSchema
		.validate(config)
		.map_err(|e| StoreError::Configuration(format!("Invalid configuration: {}", e)))?;
	Ok(Box::new(MemoryStore::new()))
}

/// Registry for the memory store implementation.
pub struct Registry;

impl bridge_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl crate::StoreRegistry for Registry {}
