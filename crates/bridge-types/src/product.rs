//! Product (SKU binding) configuration.
//!
//! A product binds one platform SKU under one shop to a delivery
//! strategy. When an inbound push matches an enabled product with
//! automatic card delivery, the engine fetches codes from the inventory
//! service without operator involvement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How orders for a SKU are fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliverType {
	/// Operator fulfills by hand.
	Manual,
	/// Cards are fetched from the inventory service automatically.
	AutoCard,
	/// Reserved for a future direct top-up API.
	DirectApiReserved,
}

impl DeliverType {
	pub fn from_u8(v: u8) -> Option<Self> {
		match v {
			0 => Some(DeliverType::Manual),
			1 => Some(DeliverType::AutoCard),
			2 => Some(DeliverType::DirectApiReserved),
			_ => None,
		}
	}

	pub fn as_u8(&self) -> u8 {
		match self {
			DeliverType::Manual => 0,
			DeliverType::AutoCard => 1,
			DeliverType::DirectApiReserved => 2,
		}
	}
}

/// One SKU binding under a shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
	pub id: i64,
	pub shop_id: i64,
	pub product_name: String,
	/// Platform SKU id matched against inbound orders.
	pub sku_id: Option<String>,
	pub deliver_type: DeliverType,
	/// Inventory card-type id, required for automatic delivery.
	pub card91_card_type_id: Option<String>,
	pub is_enabled: bool,
	pub create_time: DateTime<Utc>,
	pub update_time: DateTime<Utc>,
}

impl Product {
	/// Whether this binding triggers automatic card delivery.
	pub fn auto_delivers(&self) -> bool {
		self.is_enabled
			&& self.deliver_type == DeliverType::AutoCard
			&& self
				.card91_card_type_id
				.as_deref()
				.is_some_and(|id| !id.is_empty())
	}
}
