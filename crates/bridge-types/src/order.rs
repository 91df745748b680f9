//! Order record and its closed status sets.
//!
//! Orders are created by inbound pushes and mutated only by the
//! fulfillment engine. The `(jd_order_no, shop_id)` pair is unique; a
//! duplicate push always resolves to the existing row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CardCode, ShopType};

/// Fulfillment shape of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
	/// Top-up order; fulfillment is a signed OK callback.
	Direct,
	/// Card-code order; fulfillment delivers the codes in the callback.
	Card,
}

impl OrderType {
	pub fn from_u8(v: u8) -> Option<Self> {
		match v {
			1 => Some(OrderType::Direct),
			2 => Some(OrderType::Card),
			_ => None,
		}
	}

	pub fn as_u8(&self) -> u8 {
		match self {
			OrderType::Direct => 1,
			OrderType::Card => 2,
		}
	}
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
	Pending,
	Processing,
	Done,
	Cancelled,
	Refunded,
	Error,
}

impl OrderStatus {
	pub fn from_u8(v: u8) -> Option<Self> {
		match v {
			0 => Some(OrderStatus::Pending),
			1 => Some(OrderStatus::Processing),
			2 => Some(OrderStatus::Done),
			3 => Some(OrderStatus::Cancelled),
			4 => Some(OrderStatus::Refunded),
			5 => Some(OrderStatus::Error),
			_ => None,
		}
	}

	pub fn as_u8(&self) -> u8 {
		match self {
			OrderStatus::Pending => 0,
			OrderStatus::Processing => 1,
			OrderStatus::Done => 2,
			OrderStatus::Cancelled => 3,
			OrderStatus::Refunded => 4,
			OrderStatus::Error => 5,
		}
	}

	/// Whether a transition to `next` is allowed.
	///
	/// Transitions only advance: PENDING and PROCESSING may move to any
	/// later state; DONE may still move to REFUNDED; the remaining
	/// terminal states are frozen.
	pub fn can_transition_to(&self, next: OrderStatus) -> bool {
		match self {
			OrderStatus::Pending | OrderStatus::Processing => {
				next.as_u8() > self.as_u8()
			}
			OrderStatus::Done => next == OrderStatus::Refunded,
			OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Error => false,
		}
	}

	/// Terminal states never advance again (except DONE -> REFUNDED).
	pub fn is_terminal(&self) -> bool {
		!matches!(self, OrderStatus::Pending | OrderStatus::Processing)
	}
}

/// Outcome of the most recent platform callback for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyStatus {
	None,
	Ok,
	Fail,
}

impl NotifyStatus {
	pub fn from_u8(v: u8) -> Option<Self> {
		match v {
			0 => Some(NotifyStatus::None),
			1 => Some(NotifyStatus::Ok),
			2 => Some(NotifyStatus::Fail),
			_ => None,
		}
	}

	pub fn as_u8(&self) -> u8 {
		match self {
			NotifyStatus::None => 0,
			NotifyStatus::Ok => 1,
			NotifyStatus::Fail => 2,
		}
	}
}

/// A persisted order row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	pub id: i64,
	/// Internal order number, `ORD<YYYYmmddHHMMSS><8 hex upper>`.
	pub order_no: String,
	/// Upstream platform order number.
	pub jd_order_no: String,
	pub shop_id: i64,
	pub shop_type: ShopType,
	pub order_type: OrderType,
	pub order_status: OrderStatus,
	pub sku_id: Option<String>,
	pub product_info: Option<String>,
	/// Amount in fen (1/100 currency units).
	pub amount: i64,
	pub quantity: i64,
	/// Account to top up (direct orders).
	pub produce_account: Option<String>,
	/// Delivered card codes as a JSON array; null until delivered.
	pub card_info: Option<String>,
	/// Per-order callback URL override (general channel).
	pub notify_url: Option<String>,
	pub notify_status: NotifyStatus,
	pub notify_time: Option<DateTime<Utc>>,
	/// Whether the human notification fan-out has run for this order.
	pub notified: bool,
	pub notify_send_time: Option<DateTime<Utc>>,
	pub pay_time: Option<DateTime<Utc>>,
	pub deliver_time: Option<DateTime<Utc>>,
	pub remark: Option<String>,
	pub create_time: DateTime<Utc>,
	pub update_time: DateTime<Utc>,
}

impl Order {
	/// Parses the stored `card_info` JSON through the alias table.
	///
	/// Malformed or absent JSON yields an empty list rather than an error;
	/// the column is written by us but has historically carried several
	/// field spellings.
	pub fn cards(&self) -> Vec<CardCode> {
		self.card_info
			.as_deref()
			.map(CardCode::parse_list)
			.unwrap_or_default()
	}
}

/// The fields an inbound push provides for a new order.
///
/// The store assigns `id` and timestamps on insertion; `order_no` is
/// generated up front so the duplicate path can return it unchanged.
#[derive(Debug, Clone)]
pub struct OrderDraft {
	pub order_no: String,
	pub jd_order_no: String,
	pub shop_id: i64,
	pub shop_type: ShopType,
	pub order_type: OrderType,
	pub sku_id: Option<String>,
	pub product_info: Option<String>,
	pub amount: i64,
	pub quantity: i64,
	pub produce_account: Option<String>,
	pub notify_url: Option<String>,
}

/// Generates a fresh internal order number.
///
/// Format: `ORD` + UTC `YYYYmmddHHMMSS` + 8 uppercase hex characters.
pub fn generate_order_no() -> String {
	let stamp = Utc::now().format("%Y%m%d%H%M%S");
	let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();
	format!("ORD{}{}", stamp, suffix)
}
