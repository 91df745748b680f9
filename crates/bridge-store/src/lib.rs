//! Persistence module for the order bridge.
//!
//! This crate provides the storage abstraction used by every other
//! component: shop and product configuration lookup, idempotent order
//! insertion keyed on `(jd_order_no, shop_id)`, conditional status
//! transitions, the append-only event log, and the request/notification
//! log tables. Two backends are provided, sqlite for deployments and
//! an in-memory implementation for tests.

use async_trait::async_trait;
use thiserror::Error;

use bridge_types::{
	ApiLogDraft, CardCode, ConfigSchema, EventDraft, ImplementationRegistry, NotificationLog,
	NotificationLogDraft, NotifyStatus, Order, OrderDraft, OrderEvent, OrderStatus, Product,
	Shop, ShopType,
};

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod sqlite;
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
	/// A requested row does not exist.
	#[error("Not found")]
	NotFound,
	/// A conditional status update found the order in a different state.
	#[error("Invalid transition: order {order_id} is {current:?}, expected one of {expected:?}")]
	InvalidTransition {
		order_id: i64,
		current: OrderStatus,
		expected: Vec<OrderStatus>,
	},
	/// Serialization of a JSON column failed.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The backend reported an error.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Configuration of a backend failed validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for store backends.
///
/// All state-changing operations are transactional: once a method
/// returns, the change is visible to concurrent readers. The unique
/// `(jd_order_no, shop_id)` index is the synchronization point for
/// idempotent ingestion across request workers.
#[async_trait]
pub trait StoreInterface: Send + Sync {
	/// Returns the configuration schema for this store implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Creates tables and indexes. Safe to call repeatedly.
	async fn init_schema(&self) -> Result<(), StoreError>;

	/// Inserts a default administrator account when none exists.
	async fn ensure_admin_user(&self, username: &str, password: &str) -> Result<(), StoreError>;

	// --- shops -----------------------------------------------------------

	/// Inserts a shop, returning its assigned id. The `id` field of the
	/// input is ignored.
	async fn insert_shop(&self, shop: &Shop) -> Result<i64, StoreError>;

	async fn shop_by_id(&self, id: i64) -> Result<Shop, StoreError>;

	/// Enabled game shop carrying this `customerId`.
	async fn find_shop_by_customer_id(&self, customer_id: &str)
		-> Result<Option<Shop>, StoreError>;

	/// Enabled general shop carrying this `vendorId`.
	async fn find_shop_by_vendor_id(&self, vendor_id: &str) -> Result<Option<Shop>, StoreError>;

	/// Enabled shop by its unique code.
	async fn find_shop_by_code(&self, shop_code: &str) -> Result<Option<Shop>, StoreError>;

	/// First enabled shop of a channel, used by the legacy identity fallback.
	async fn first_enabled_shop(&self, shop_type: ShopType) -> Result<Option<Shop>, StoreError>;

	// --- products --------------------------------------------------------

	/// Inserts a product, returning its assigned id.
	async fn insert_product(&self, product: &Product) -> Result<i64, StoreError>;

	/// Enabled auto-delivery product bound to `(shop_id, sku_id)`.
	async fn find_auto_product(
		&self,
		shop_id: i64,
		sku_id: &str,
	) -> Result<Option<Product>, StoreError>;

	// --- orders ----------------------------------------------------------

	/// Atomic insert-or-fetch on the `(jd_order_no, shop_id)` key.
	///
	/// Returns the order and whether this call created it. Under
	/// concurrent identical pushes exactly one caller sees `true`.
	async fn insert_order_if_absent(
		&self,
		draft: &OrderDraft,
	) -> Result<(Order, bool), StoreError>;

	async fn order_by_id(&self, id: i64) -> Result<Order, StoreError>;

	/// Unique lookup; when `shop_id` is `None` the first match wins.
	async fn find_order(
		&self,
		jd_order_no: &str,
		shop_id: Option<i64>,
	) -> Result<Option<Order>, StoreError>;

	/// Conditional status update.
	///
	/// Fails with [`StoreError::InvalidTransition`] unless the current
	/// status is in `expect_in`. Returns the updated order.
	async fn transition(
		&self,
		order_id: i64,
		new_status: OrderStatus,
		expect_in: &[OrderStatus],
	) -> Result<Order, StoreError>;

	/// Writes the delivered cards as JSON and stamps `deliver_time`.
	async fn set_card_info(&self, order_id: i64, cards: &[CardCode]) -> Result<(), StoreError>;

	/// Records the outcome of the latest platform callback.
	async fn set_notify_status(
		&self,
		order_id: i64,
		status: NotifyStatus,
	) -> Result<(), StoreError>;

	/// Marks the human-notification fan-out as having run.
	async fn mark_notified(&self, order_id: i64) -> Result<(), StoreError>;

	// --- event log -------------------------------------------------------

	/// Appends one row to the order event log.
	async fn append_event(
		&self,
		order_id: i64,
		order_no: &str,
		event: &EventDraft,
	) -> Result<(), StoreError>;

	/// Events for one order in append order.
	async fn events_for_order(&self, order_id: i64) -> Result<Vec<OrderEvent>, StoreError>;

	// --- request / notification logs ------------------------------------

	async fn append_api_log(&self, draft: &ApiLogDraft) -> Result<(), StoreError>;

	async fn append_notification_log(
		&self,
		draft: &NotificationLogDraft,
	) -> Result<i64, StoreError>;

	async fn notification_log_by_id(&self, id: i64) -> Result<NotificationLog, StoreError>;
}

/// Type alias for store factory functions.
///
/// Backends are constructed lazily from their TOML section so the
/// factory itself stays synchronous.
pub type StoreFactory = fn(&toml::Value) -> Result<Box<dyn StoreInterface>, StoreError>;

/// Registry trait for store implementations.
pub trait StoreRegistry: ImplementationRegistry<Factory = StoreFactory> {}

/// Get all registered store implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StoreFactory)> {
	use implementations::{memory, sqlite};

	vec![
		(sqlite::Registry::NAME, sqlite::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level store service shared by handlers and the engine.
///
/// Wraps a backend with the channel-aware shop resolution chain and the
/// best-effort event append (a dropped event must never fail the
/// primary transaction).
pub struct StoreService {
	backend: Box<dyn StoreInterface>,
}

impl StoreService {
	/// Creates a new StoreService with the specified backend.
	pub fn new(backend: Box<dyn StoreInterface>) -> Self {
		Self { backend }
	}

	/// The wrapped backend.
	pub fn backend(&self) -> &dyn StoreInterface {
		&*self.backend
	}

	/// Resolves the shop an inbound push belongs to.
	///
	/// For the game channel the identity is `customerId`, for the general
	/// channel `vendorId`; both fall back to a `shop_code` lookup. Only
	/// enabled shops resolve.
	pub async fn resolve_shop(
		&self,
		channel: ShopType,
		identity: Option<&str>,
		shop_code: Option<&str>,
	) -> Result<Option<Shop>, StoreError> {
		if let Some(identity) = identity.filter(|v| !v.is_empty()) {
			let found = match channel {
				ShopType::Game => self.backend.find_shop_by_customer_id(identity).await?,
				ShopType::General => self.backend.find_shop_by_vendor_id(identity).await?,
			};
			if found.is_some() {
				return Ok(found);
			}
			// Some clients put the shop code where the channel identity goes.
			if let Some(by_code) = self.backend.find_shop_by_code(identity).await? {
				return Ok(Some(by_code));
			}
		}
		if let Some(code) = shop_code.filter(|v| !v.is_empty()) {
			return self.backend.find_shop_by_code(code).await;
		}
		Ok(None)
	}

	/// Appends an event, downgrading failures to a warning.
	///
	/// The event log is diagnostic; losing a row must not abort the
	/// order mutation that produced it.
	pub async fn append_event_best_effort(&self, order: &Order, event: EventDraft) {
		if let Err(e) = self
			.backend
			.append_event(order.id, &order.order_no, &event)
			.await
		{
			tracing::warn!(
				order_no = %order.order_no,
				event_type = event.event_type.as_str(),
				"event log dropped: {}",
				e
			);
		}
	}
}
