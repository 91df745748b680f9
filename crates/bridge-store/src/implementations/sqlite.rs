//! Sqlite store backend.
//!
//! Persists every table in a single sqlite database through an sqlx
//! connection pool. The `(jd_order_no, shop_id)` unique index is the
//! concurrency anchor: idempotent ingestion is an `INSERT .. ON CONFLICT
//! DO NOTHING` followed by a read of the surviving row, and conditional
//! transitions are single `UPDATE .. WHERE order_status IN (..)`
//! statements. Transient backend errors (a locked database file) are
//! retried once before propagating.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::{StoreError, StoreInterface};
use bridge_types::{
	cards_to_stored_json, now_utc, ApiLogDraft, CardCode, ConfigSchema, DeliverType, EventDraft,
	EventResult, EventType, Field, FieldType, ImplementationRegistry, InventoryDialect,
	NotificationLog, NotificationLogDraft, NotifyChannel, NotifyStatus, Order, OrderDraft,
	OrderEvent, OrderStatus, OrderType, Product, Schema, Shop, ShopType, ValidationError,
};

/// Statements executed by `init_schema`, one table or index each.
const SCHEMA: &[&str] = &[
	"CREATE TABLE IF NOT EXISTS shops (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		shop_name TEXT NOT NULL,
		shop_code TEXT NOT NULL UNIQUE,
		shop_type INTEGER NOT NULL,
		game_customer_id TEXT,
		game_md5_secret TEXT,
		game_direct_callback_url TEXT,
		game_card_callback_url TEXT,
		game_api_url TEXT,
		general_vendor_id TEXT,
		general_md5_secret TEXT,
		general_aes_secret TEXT,
		general_callback_url TEXT,
		card91_dialect TEXT,
		card91_api_url TEXT,
		card91_api_key TEXT,
		card91_api_secret TEXT,
		notify_enabled INTEGER NOT NULL DEFAULT 0,
		dingtalk_webhook TEXT,
		dingtalk_secret TEXT,
		wecom_webhook TEXT,
		is_enabled INTEGER NOT NULL DEFAULT 1,
		expire_time TEXT,
		create_time TEXT NOT NULL,
		update_time TEXT NOT NULL
	)",
	"CREATE TABLE IF NOT EXISTS products (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		shop_id INTEGER NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
		product_name TEXT NOT NULL,
		sku_id TEXT,
		deliver_type INTEGER NOT NULL DEFAULT 0,
		card91_card_type_id TEXT,
		is_enabled INTEGER NOT NULL DEFAULT 1,
		create_time TEXT NOT NULL,
		update_time TEXT NOT NULL
	)",
	"CREATE INDEX IF NOT EXISTS idx_products_shop_sku ON products (shop_id, sku_id)",
	"CREATE TABLE IF NOT EXISTS orders (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		order_no TEXT NOT NULL UNIQUE,
		jd_order_no TEXT NOT NULL,
		shop_id INTEGER NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
		shop_type INTEGER NOT NULL,
		order_type INTEGER NOT NULL,
		order_status INTEGER NOT NULL DEFAULT 0,
		sku_id TEXT,
		product_info TEXT,
		amount INTEGER NOT NULL,
		quantity INTEGER NOT NULL DEFAULT 1,
		produce_account TEXT,
		card_info TEXT,
		notify_url TEXT,
		notify_status INTEGER NOT NULL DEFAULT 0,
		notify_time TEXT,
		notified INTEGER NOT NULL DEFAULT 0,
		notify_send_time TEXT,
		pay_time TEXT,
		deliver_time TEXT,
		remark TEXT,
		create_time TEXT NOT NULL,
		update_time TEXT NOT NULL
	)",
	"CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_jd_shop ON orders (jd_order_no, shop_id)",
	"CREATE TABLE IF NOT EXISTS order_events (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
		order_no TEXT,
		event_type TEXT NOT NULL,
		event_desc TEXT,
		event_data TEXT,
		operator TEXT,
		result TEXT NOT NULL DEFAULT 'info',
		create_time TEXT NOT NULL
	)",
	"CREATE INDEX IF NOT EXISTS idx_order_events_order ON order_events (order_id)",
	"CREATE TABLE IF NOT EXISTS notification_logs (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
		shop_id INTEGER NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
		channel TEXT NOT NULL,
		success INTEGER NOT NULL DEFAULT 0,
		attempt INTEGER NOT NULL DEFAULT 1,
		request_data TEXT,
		response_data TEXT,
		error_message TEXT,
		create_time TEXT NOT NULL
	)",
	"CREATE TABLE IF NOT EXISTS api_logs (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		shop_id INTEGER REFERENCES shops(id) ON DELETE SET NULL,
		api_type TEXT,
		request_method TEXT,
		request_url TEXT,
		request_body TEXT,
		response_status INTEGER,
		response_body TEXT,
		ip_address TEXT,
		create_time TEXT NOT NULL
	)",
	"CREATE TABLE IF NOT EXISTS users (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		username TEXT NOT NULL UNIQUE,
		password TEXT NOT NULL,
		is_admin INTEGER NOT NULL DEFAULT 1,
		create_time TEXT NOT NULL
	)",
];

/// Sqlite store implementation.
pub struct SqliteStore {
	pool: SqlitePool,
}

impl SqliteStore {
	/// Opens a lazy connection pool against the given sqlite URL.
	pub fn connect(url: &str) -> Result<Self, StoreError> {
		let pool = SqlitePoolOptions::new()
			.max_connections(5)
			.connect_lazy(url)
			.map_err(|e| StoreError::Configuration(e.to_string()))?;
		Ok(Self { pool })
	}
}

fn backend_err(e: sqlx::Error) -> StoreError {
	StoreError::Backend(e.to_string())
}

/// Whether an error is worth one immediate retry.
fn is_transient(e: &sqlx::Error) -> bool {
	match e {
		sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
		sqlx::Error::Database(db) => {
			let msg = db.message().to_lowercase();
			msg.contains("locked") || msg.contains("busy")
		}
		_ => false,
	}
}

fn row_to_shop(row: &SqliteRow) -> Result<Shop, StoreError> {
	let shop_type_raw: i64 = row.try_get("shop_type").map_err(backend_err)?;
	let shop_type = ShopType::from_u8(shop_type_raw as u8)
		.ok_or_else(|| StoreError::Backend(format!("bad shop_type {}", shop_type_raw)))?;
	let dialect: Option<String> = row.try_get("card91_dialect").map_err(backend_err)?;
	Ok(Shop {
		id: row.try_get("id").map_err(backend_err)?,
		shop_name: row.try_get("shop_name").map_err(backend_err)?,
		shop_code: row.try_get("shop_code").map_err(backend_err)?,
		shop_type,
		game_customer_id: row.try_get("game_customer_id").map_err(backend_err)?,
		game_md5_secret: row.try_get("game_md5_secret").map_err(backend_err)?,
		game_direct_callback_url: row
			.try_get("game_direct_callback_url")
			.map_err(backend_err)?,
		game_card_callback_url: row.try_get("game_card_callback_url").map_err(backend_err)?,
		game_api_url: row.try_get("game_api_url").map_err(backend_err)?,
		general_vendor_id: row.try_get("general_vendor_id").map_err(backend_err)?,
		general_md5_secret: row.try_get("general_md5_secret").map_err(backend_err)?,
		general_aes_secret: row.try_get("general_aes_secret").map_err(backend_err)?,
		general_callback_url: row.try_get("general_callback_url").map_err(backend_err)?,
		card91_dialect: dialect.as_deref().and_then(InventoryDialect::from_str_opt),
		card91_api_url: row.try_get("card91_api_url").map_err(backend_err)?,
		card91_api_key: row.try_get("card91_api_key").map_err(backend_err)?,
		card91_api_secret: row.try_get("card91_api_secret").map_err(backend_err)?,
		notify_enabled: row
			.try_get::<i64, _>("notify_enabled")
			.map_err(backend_err)?
			!= 0,
		dingtalk_webhook: row.try_get("dingtalk_webhook").map_err(backend_err)?,
		dingtalk_secret: row.try_get("dingtalk_secret").map_err(backend_err)?,
		wecom_webhook: row.try_get("wecom_webhook").map_err(backend_err)?,
		is_enabled: row.try_get::<i64, _>("is_enabled").map_err(backend_err)? != 0,
		expire_time: row.try_get("expire_time").map_err(backend_err)?,
		create_time: row.try_get("create_time").map_err(backend_err)?,
		update_time: row.try_get("update_time").map_err(backend_err)?,
	})
}

fn row_to_product(row: &SqliteRow) -> Result<Product, StoreError> {
	let deliver_raw: i64 = row.try_get("deliver_type").map_err(backend_err)?;
	let deliver_type = DeliverType::from_u8(deliver_raw as u8)
		.ok_or_else(|| StoreError::Backend(format!("bad deliver_type {}", deliver_raw)))?;
	Ok(Product {
		id: row.try_get("id").map_err(backend_err)?,
		shop_id: row.try_get("shop_id").map_err(backend_err)?,
		product_name: row.try_get("product_name").map_err(backend_err)?,
		sku_id: row.try_get("sku_id").map_err(backend_err)?,
		deliver_type,
		card91_card_type_id: row.try_get("card91_card_type_id").map_err(backend_err)?,
		is_enabled: row.try_get::<i64, _>("is_enabled").map_err(backend_err)? != 0,
		create_time: row.try_get("create_time").map_err(backend_err)?,
		update_time: row.try_get("update_time").map_err(backend_err)?,
	})
}

fn row_to_order(row: &SqliteRow) -> Result<Order, StoreError> {
	let shop_type_raw: i64 = row.try_get("shop_type").map_err(backend_err)?;
	let order_type_raw: i64 = row.try_get("order_type").map_err(backend_err)?;
	let status_raw: i64 = row.try_get("order_status").map_err(backend_err)?;
	let notify_raw: i64 = row.try_get("notify_status").map_err(backend_err)?;
	Ok(Order {
		id: row.try_get("id").map_err(backend_err)?,
		order_no: row.try_get("order_no").map_err(backend_err)?,
		jd_order_no: row.try_get("jd_order_no").map_err(backend_err)?,
		shop_id: row.try_get("shop_id").map_err(backend_err)?,
		shop_type: ShopType::from_u8(shop_type_raw as u8)
			.ok_or_else(|| StoreError::Backend(format!("bad shop_type {}", shop_type_raw)))?,
		order_type: OrderType::from_u8(order_type_raw as u8)
			.ok_or_else(|| StoreError::Backend(format!("bad order_type {}", order_type_raw)))?,
		order_status: OrderStatus::from_u8(status_raw as u8)
			.ok_or_else(|| StoreError::Backend(format!("bad order_status {}", status_raw)))?,
		sku_id: row.try_get("sku_id").map_err(backend_err)?,
		product_info: row.try_get("product_info").map_err(backend_err)?,
		amount: row.try_get("amount").map_err(backend_err)?,
		quantity: row.try_get("quantity").map_err(backend_err)?,
		produce_account: row.try_get("produce_account").map_err(backend_err)?,
		card_info: row.try_get("card_info").map_err(backend_err)?,
		notify_url: row.try_get("notify_url").map_err(backend_err)?,
		notify_status: NotifyStatus::from_u8(notify_raw as u8)
			.ok_or_else(|| StoreError::Backend(format!("bad notify_status {}", notify_raw)))?,
		notify_time: row.try_get("notify_time").map_err(backend_err)?,
		notified: row.try_get::<i64, _>("notified").map_err(backend_err)? != 0,
		notify_send_time: row.try_get("notify_send_time").map_err(backend_err)?,
		pay_time: row.try_get("pay_time").map_err(backend_err)?,
		deliver_time: row.try_get("deliver_time").map_err(backend_err)?,
		remark: row.try_get("remark").map_err(backend_err)?,
		create_time: row.try_get("create_time").map_err(backend_err)?,
		update_time: row.try_get("update_time").map_err(backend_err)?,
	})
}

fn row_to_event(row: &SqliteRow) -> Result<OrderEvent, StoreError> {
	let event_type_raw: String = row.try_get("event_type").map_err(backend_err)?;
	let result_raw: String = row.try_get("result").map_err(backend_err)?;
	Ok(OrderEvent {
		id: row.try_get("id").map_err(backend_err)?,
		order_id: row.try_get("order_id").map_err(backend_err)?,
		order_no: row
			.try_get::<Option<String>, _>("order_no")
			.map_err(backend_err)?
			.unwrap_or_default(),
		event_type: EventType::from_str_opt(&event_type_raw)
			.ok_or_else(|| StoreError::Backend(format!("bad event_type {}", event_type_raw)))?,
		event_desc: row
			.try_get::<Option<String>, _>("event_desc")
			.map_err(backend_err)?
			.unwrap_or_default(),
		event_data: row.try_get("event_data").map_err(backend_err)?,
		operator: row.try_get("operator").map_err(backend_err)?,
		result: EventResult::from_str_opt(&result_raw)
			.ok_or_else(|| StoreError::Backend(format!("bad result {}", result_raw)))?,
		create_time: row.try_get("create_time").map_err(backend_err)?,
	})
}

fn row_to_notification_log(row: &SqliteRow) -> Result<NotificationLog, StoreError> {
	let channel_raw: String = row.try_get("channel").map_err(backend_err)?;
	Ok(NotificationLog {
		id: row.try_get("id").map_err(backend_err)?,
		order_id: row.try_get("order_id").map_err(backend_err)?,
		shop_id: row.try_get("shop_id").map_err(backend_err)?,
		channel: NotifyChannel::from_str_opt(&channel_raw)
			.ok_or_else(|| StoreError::Backend(format!("bad channel {}", channel_raw)))?,
		success: row.try_get::<i64, _>("success").map_err(backend_err)? != 0,
		attempt: row.try_get::<i64, _>("attempt").map_err(backend_err)? as u32,
		request_data: row.try_get("request_data").map_err(backend_err)?,
		response_data: row.try_get("response_data").map_err(backend_err)?,
		error_message: row.try_get("error_message").map_err(backend_err)?,
		create_time: row.try_get("create_time").map_err(backend_err)?,
	})
}

impl SqliteStore {
	async fn try_insert_order(&self, draft: &OrderDraft) -> Result<u64, sqlx::Error> {
		let now = now_utc();
		let result = sqlx::query(
			"INSERT INTO orders (
				order_no, jd_order_no, shop_id, shop_type, order_type, order_status,
				sku_id, product_info, amount, quantity, produce_account, notify_url,
				notify_status, notified, create_time, update_time
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
			ON CONFLICT (jd_order_no, shop_id) DO NOTHING",
		)
		.bind(&draft.order_no)
		.bind(&draft.jd_order_no)
		.bind(draft.shop_id)
		.bind(draft.shop_type.as_u8() as i64)
		.bind(draft.order_type.as_u8() as i64)
		.bind(OrderStatus::Pending.as_u8() as i64)
		.bind(&draft.sku_id)
		.bind(&draft.product_info)
		.bind(draft.amount)
		.bind(draft.quantity)
		.bind(&draft.produce_account)
		.bind(&draft.notify_url)
		.bind(now)
		.bind(now)
		.execute(&self.pool)
		.await?;
		Ok(result.rows_affected())
	}

	async fn try_append_event(
		&self,
		order_id: i64,
		order_no: &str,
		event: &EventDraft,
		event_data: Option<&str>,
	) -> Result<(), sqlx::Error> {
		sqlx::query(
			"INSERT INTO order_events
				(order_id, order_no, event_type, event_desc, event_data, operator, result, create_time)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(order_id)
		.bind(order_no)
		.bind(event.event_type.as_str())
		.bind(&event.event_desc)
		.bind(event_data)
		.bind(&event.operator)
		.bind(event.result.as_str())
		.bind(now_utc())
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

#[async_trait]
impl StoreInterface for SqliteStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SqliteStoreSchema)
	}

	async fn init_schema(&self) -> Result<(), StoreError> {
		for statement in SCHEMA {
			sqlx::query(statement)
				.execute(&self.pool)
				.await
				.map_err(backend_err)?;
		}
		Ok(())
	}

	async fn ensure_admin_user(&self, username: &str, password: &str) -> Result<(), StoreError> {
		sqlx::query(
			"INSERT INTO users (username, password, is_admin, create_time)
			VALUES (?, ?, 1, ?)
			ON CONFLICT (username) DO NOTHING",
		)
		.bind(username)
		.bind(password)
		.bind(now_utc())
		.execute(&self.pool)
		.await
		.map_err(backend_err)?;
		Ok(())
	}

	async fn insert_shop(&self, shop: &Shop) -> Result<i64, StoreError> {
		let now = now_utc();
		let result = sqlx::query(
			"INSERT INTO shops (
				shop_name, shop_code, shop_type,
				game_customer_id, game_md5_secret, game_direct_callback_url,
				game_card_callback_url, game_api_url,
				general_vendor_id, general_md5_secret, general_aes_secret,
				general_callback_url,
				card91_dialect, card91_api_url, card91_api_key, card91_api_secret,
				notify_enabled, dingtalk_webhook, dingtalk_secret, wecom_webhook,
				is_enabled, expire_time, create_time, update_time
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(&shop.shop_name)
		.bind(&shop.shop_code)
		.bind(shop.shop_type.as_u8() as i64)
		.bind(&shop.game_customer_id)
		.bind(&shop.game_md5_secret)
		.bind(&shop.game_direct_callback_url)
		.bind(&shop.game_card_callback_url)
		.bind(&shop.game_api_url)
		.bind(&shop.general_vendor_id)
		.bind(&shop.general_md5_secret)
		.bind(&shop.general_aes_secret)
		.bind(&shop.general_callback_url)
		.bind(shop.card91_dialect.map(|d| d.as_str()))
		.bind(&shop.card91_api_url)
		.bind(&shop.card91_api_key)
		.bind(&shop.card91_api_secret)
		.bind(shop.notify_enabled as i64)
		.bind(&shop.dingtalk_webhook)
		.bind(&shop.dingtalk_secret)
		.bind(&shop.wecom_webhook)
		.bind(shop.is_enabled as i64)
		.bind(shop.expire_time)
		.bind(now)
		.bind(now)
		.execute(&self.pool)
		.await
		.map_err(backend_err)?;
		Ok(result.last_insert_rowid())
	}

	async fn shop_by_id(&self, id: i64) -> Result<Shop, StoreError> {
		let row = sqlx::query("SELECT * FROM shops WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await
			.map_err(backend_err)?
			.ok_or(StoreError::NotFound)?;
		row_to_shop(&row)
	}

	async fn find_shop_by_customer_id(
		&self,
		customer_id: &str,
	) -> Result<Option<Shop>, StoreError> {
		let row = sqlx::query(
			"SELECT * FROM shops WHERE game_customer_id = ? AND is_enabled = 1 LIMIT 1",
		)
		.bind(customer_id)
		.fetch_optional(&self.pool)
		.await
		.map_err(backend_err)?;
		row.as_ref().map(row_to_shop).transpose()
	}

	async fn find_shop_by_vendor_id(&self, vendor_id: &str) -> Result<Option<Shop>, StoreError> {
		let row = sqlx::query(
			"SELECT * FROM shops WHERE general_vendor_id = ? AND is_enabled = 1 LIMIT 1",
		)
		.bind(vendor_id)
		.fetch_optional(&self.pool)
		.await
		.map_err(backend_err)?;
		row.as_ref().map(row_to_shop).transpose()
	}

	async fn find_shop_by_code(&self, shop_code: &str) -> Result<Option<Shop>, StoreError> {
		let row = sqlx::query("SELECT * FROM shops WHERE shop_code = ? AND is_enabled = 1 LIMIT 1")
			.bind(shop_code)
			.fetch_optional(&self.pool)
			.await
			.map_err(backend_err)?;
		row.as_ref().map(row_to_shop).transpose()
	}

	async fn first_enabled_shop(&self, shop_type: ShopType) -> Result<Option<Shop>, StoreError> {
		let row = sqlx::query(
			"SELECT * FROM shops WHERE shop_type = ? AND is_enabled = 1 ORDER BY id LIMIT 1",
		)
		.bind(shop_type.as_u8() as i64)
		.fetch_optional(&self.pool)
		.await
		.map_err(backend_err)?;
		row.as_ref().map(row_to_shop).transpose()
	}

	async fn insert_product(&self, product: &Product) -> Result<i64, StoreError> {
		let now = now_utc();
		let result = sqlx::query(
			"INSERT INTO products (
				shop_id, product_name, sku_id, deliver_type, card91_card_type_id,
				is_enabled, create_time, update_time
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(product.shop_id)
		.bind(&product.product_name)
		.bind(&product.sku_id)
		.bind(product.deliver_type.as_u8() as i64)
		.bind(&product.card91_card_type_id)
		.bind(product.is_enabled as i64)
		.bind(now)
		.bind(now)
		.execute(&self.pool)
		.await
		.map_err(backend_err)?;
		Ok(result.last_insert_rowid())
	}

	async fn find_auto_product(
		&self,
		shop_id: i64,
		sku_id: &str,
	) -> Result<Option<Product>, StoreError> {
		let row = sqlx::query(
			"SELECT * FROM products
			WHERE shop_id = ? AND sku_id = ? AND is_enabled = 1 AND deliver_type = ?
			LIMIT 1",
		)
		.bind(shop_id)
		.bind(sku_id)
		.bind(DeliverType::AutoCard.as_u8() as i64)
		.fetch_optional(&self.pool)
		.await
		.map_err(backend_err)?;
		row.as_ref().map(row_to_product).transpose()
	}

	async fn insert_order_if_absent(
		&self,
		draft: &OrderDraft,
	) -> Result<(Order, bool), StoreError> {
		let affected = match self.try_insert_order(draft).await {
			Ok(n) => n,
			Err(e) if is_transient(&e) => {
				self.try_insert_order(draft).await.map_err(backend_err)?
			}
			Err(e) => return Err(backend_err(e)),
		};

		let order = self
			.find_order(&draft.jd_order_no, Some(draft.shop_id))
			.await?
			.ok_or(StoreError::NotFound)?;
		Ok((order, affected > 0))
	}

	async fn order_by_id(&self, id: i64) -> Result<Order, StoreError> {
		let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await
			.map_err(backend_err)?
			.ok_or(StoreError::NotFound)?;
		row_to_order(&row)
	}

	async fn find_order(
		&self,
		jd_order_no: &str,
		shop_id: Option<i64>,
	) -> Result<Option<Order>, StoreError> {
		let row = match shop_id {
			Some(sid) => {
				sqlx::query("SELECT * FROM orders WHERE jd_order_no = ? AND shop_id = ?")
					.bind(jd_order_no)
					.bind(sid)
					.fetch_optional(&self.pool)
					.await
			}
			None => {
				sqlx::query("SELECT * FROM orders WHERE jd_order_no = ? ORDER BY id LIMIT 1")
					.bind(jd_order_no)
					.fetch_optional(&self.pool)
					.await
			}
		}
		.map_err(backend_err)?;
		row.as_ref().map(row_to_order).transpose()
	}

	async fn transition(
		&self,
		order_id: i64,
		new_status: OrderStatus,
		expect_in: &[OrderStatus],
	) -> Result<Order, StoreError> {
		if expect_in.is_empty() {
			return Err(StoreError::Backend("empty expected-state set".to_string()));
		}
		let placeholders = vec!["?"; expect_in.len()].join(", ");
		let sql = format!(
			"UPDATE orders SET order_status = ?, update_time = ? WHERE id = ? AND order_status IN ({})",
			placeholders
		);
		let mut query = sqlx::query(&sql)
			.bind(new_status.as_u8() as i64)
			.bind(now_utc())
			.bind(order_id);
		for status in expect_in {
			query = query.bind(status.as_u8() as i64);
		}
		let result = query.execute(&self.pool).await.map_err(backend_err)?;

		if result.rows_affected() == 0 {
			let current = self.order_by_id(order_id).await?;
			return Err(StoreError::InvalidTransition {
				order_id,
				current: current.order_status,
				expected: expect_in.to_vec(),
			});
		}
		self.order_by_id(order_id).await
	}

	async fn set_card_info(&self, order_id: i64, cards: &[CardCode]) -> Result<(), StoreError> {
		let now = now_utc();
		let result = sqlx::query(
			"UPDATE orders SET card_info = ?, deliver_time = ?, update_time = ? WHERE id = ?",
		)
		.bind(cards_to_stored_json(cards))
		.bind(now)
		.bind(now)
		.bind(order_id)
		.execute(&self.pool)
		.await
		.map_err(backend_err)?;
		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound);
		}
		Ok(())
	}

	async fn set_notify_status(
		&self,
		order_id: i64,
		status: NotifyStatus,
	) -> Result<(), StoreError> {
		let now = now_utc();
		let result = sqlx::query(
			"UPDATE orders SET notify_status = ?, notify_time = ?, update_time = ? WHERE id = ?",
		)
		.bind(status.as_u8() as i64)
		.bind(now)
		.bind(now)
		.bind(order_id)
		.execute(&self.pool)
		.await
		.map_err(backend_err)?;
		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound);
		}
		Ok(())
	}

	async fn mark_notified(&self, order_id: i64) -> Result<(), StoreError> {
		let result =
			sqlx::query("UPDATE orders SET notified = 1, notify_send_time = ? WHERE id = ?")
				.bind(now_utc())
				.bind(order_id)
				.execute(&self.pool)
				.await
				.map_err(backend_err)?;
		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound);
		}
		Ok(())
	}

	async fn append_event(
		&self,
		order_id: i64,
		order_no: &str,
		event: &EventDraft,
	) -> Result<(), StoreError> {
		let event_data = match &event.event_data {
			Some(v) => Some(
				serde_json::to_string(v)
					.map_err(|e| StoreError::Serialization(e.to_string()))?,
			),
			None => None,
		};
		match self
			.try_append_event(order_id, order_no, event, event_data.as_deref())
			.await
		{
			Ok(()) => Ok(()),
			Err(e) if is_transient(&e) => self
				.try_append_event(order_id, order_no, event, event_data.as_deref())
				.await
				.map_err(backend_err),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn events_for_order(&self, order_id: i64) -> Result<Vec<OrderEvent>, StoreError> {
		let rows = sqlx::query("SELECT * FROM order_events WHERE order_id = ? ORDER BY id")
			.bind(order_id)
			.fetch_all(&self.pool)
			.await
			.map_err(backend_err)?;
		rows.iter().map(row_to_event).collect()
	}

	async fn append_api_log(&self, draft: &ApiLogDraft) -> Result<(), StoreError> {
		sqlx::query(
			"INSERT INTO api_logs (
				shop_id, api_type, request_method, request_url, request_body,
				response_status, response_body, ip_address, create_time
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(draft.shop_id)
		.bind(&draft.api_type)
		.bind(&draft.request_method)
		.bind(&draft.request_url)
		.bind(&draft.request_body)
		.bind(draft.response_status as i64)
		.bind(&draft.response_body)
		.bind(&draft.ip_address)
		.bind(now_utc())
		.execute(&self.pool)
		.await
		.map_err(backend_err)?;
		Ok(())
	}

	async fn append_notification_log(
		&self,
		draft: &NotificationLogDraft,
	) -> Result<i64, StoreError> {
		let result = sqlx::query(
			"INSERT INTO notification_logs (
				order_id, shop_id, channel, success, attempt,
				request_data, response_data, error_message, create_time
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(draft.order_id)
		.bind(draft.shop_id)
		.bind(draft.channel.as_str())
		.bind(draft.success as i64)
		.bind(draft.attempt as i64)
		.bind(&draft.request_data)
		.bind(&draft.response_data)
		.bind(&draft.error_message)
		.bind(now_utc())
		.execute(&self.pool)
		.await
		.map_err(backend_err)?;
		Ok(result.last_insert_rowid())
	}

	async fn notification_log_by_id(&self, id: i64) -> Result<NotificationLog, StoreError> {
		let row = sqlx::query("SELECT * FROM notification_logs WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await
			.map_err(backend_err)?
			.ok_or(StoreError::NotFound)?;
		row_to_notification_log(&row)
	}
}

/// Configuration schema for SqliteStore.
pub struct SqliteStoreSchema;

impl ConfigSchema for SqliteStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("path", FieldType::String)],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a sqlite store from configuration.
///
/// Configuration parameters:
/// - `path`: database file path, or a full `sqlite:` URL
pub fn create_store(config: &toml::Value) -> Result<Box<dyn StoreInterface>, StoreError> {
	SqliteStoreSchema
		.validate(config)
		.map_err(|e| StoreError::Configuration(format!("Invalid configuration: {}", e)))?;

	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.unwrap_or("bridge.db");
	let url = if path.starts_with("sqlite:") {
		path.to_string()
	} else {
		format!("sqlite://{}?mode=rwc", path)
	};

	Ok(Box::new(SqliteStore::connect(&url)?))
}

/// Registry for the sqlite store implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "sqlite";
	type Factory = crate::StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl crate::StoreRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_types::{generate_order_no, OrderType};

	async fn scratch_store() -> (SqliteStore, tempfile::TempDir) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("bridge-test.db");
		let url = format!("sqlite://{}?mode=rwc", path.display());
		let store = SqliteStore::connect(&url).unwrap();
		store.init_schema().await.unwrap();
		(store, dir)
	}

	fn shop() -> Shop {
		let now = now_utc();
		Shop {
			id: 0,
			shop_name: "Test shop".to_string(),
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
			card91_dialect: Some(InventoryDialect::Agiso),
			card91_api_url: None,
			card91_api_key: Some("token".to_string()),
			card91_api_secret: Some("secret".to_string()),
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

	fn draft(jd: &str, shop_id: i64) -> OrderDraft {
		OrderDraft {
			order_no: generate_order_no(),
			jd_order_no: jd.to_string(),
			shop_id,
			shop_type: ShopType::Game,
			order_type: OrderType::Direct,
			sku_id: None,
			product_info: None,
			amount: 100,
			quantity: 1,
			produce_account: Some("acct".to_string()),
			notify_url: None,
		}
	}

	#[tokio::test]
	async fn schema_and_shop_round_trip() {
		let (store, _dir) = scratch_store().await;
		let id = store.insert_shop(&shop()).await.unwrap();

		let loaded = store.shop_by_id(id).await.unwrap();
		assert_eq!(loaded.shop_code, "TEST01");
		assert_eq!(loaded.card91_dialect, Some(InventoryDialect::Agiso));
		assert!(loaded.is_enabled);

		let by_customer = store.find_shop_by_customer_id("C1").await.unwrap();
		assert_eq!(by_customer.map(|s| s.id), Some(id));
	}

	#[tokio::test]
	async fn unique_index_makes_ingest_idempotent() {
		let (store, _dir) = scratch_store().await;
		let shop_id = store.insert_shop(&shop()).await.unwrap();

		let (first, created) = store
			.insert_order_if_absent(&draft("JD1", shop_id))
			.await
			.unwrap();
		assert!(created);

		let (second, created) = store
			.insert_order_if_absent(&draft("JD1", shop_id))
			.await
			.unwrap();
		assert!(!created);
		assert_eq!(second.id, first.id);
		assert_eq!(second.order_no, first.order_no);
	}

	#[tokio::test]
	async fn conditional_transition_rejects_unexpected_state() {
		let (store, _dir) = scratch_store().await;
		let shop_id = store.insert_shop(&shop()).await.unwrap();
		let (order, _) = store
			.insert_order_if_absent(&draft("JD2", shop_id))
			.await
			.unwrap();

		let updated = store
			.transition(
				order.id,
				OrderStatus::Done,
				&[OrderStatus::Pending, OrderStatus::Processing],
			)
			.await
			.unwrap();
		assert_eq!(updated.order_status, OrderStatus::Done);

		let err = store
			.transition(order.id, OrderStatus::Cancelled, &[OrderStatus::Pending])
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			StoreError::InvalidTransition { current: OrderStatus::Done, .. }
		));
	}

	#[tokio::test]
	async fn event_ids_are_monotonic_per_order() {
		let (store, _dir) = scratch_store().await;
		let shop_id = store.insert_shop(&shop()).await.unwrap();
		let (order, _) = store
			.insert_order_if_absent(&draft("JD3", shop_id))
			.await
			.unwrap();

		for i in 0..3 {
			store
				.append_event(
					order.id,
					&order.order_no,
					&EventDraft::new(
						EventType::StatusChanged,
						format!("step {}", i),
						EventResult::Info,
					),
				)
				.await
				.unwrap();
		}

		let events = store.events_for_order(order.id).await.unwrap();
		assert_eq!(events.len(), 3);
		assert!(events.windows(2).all(|w| w[0].id < w[1].id));
		assert!(events.windows(2).all(|w| w[0].create_time <= w[1].create_time));
	}
}
