//! Shop (tenant) configuration record.
//!
//! A shop is one seller account on the upstream platform. It carries the
//! per-channel credentials used to authenticate inbound pushes and sign
//! outbound callbacks, the inventory-service credentials for automatic
//! card fetching, and the notification webhooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which protocol family a shop speaks.
///
/// Stored as a small integer; the two channels differ in envelope format
/// (base64-JSON vs flat form + AES card payload) and signing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShopType {
	/// Game-card channel (base64-JSON envelope, `customerId` identity).
	Game,
	/// Generic card-code channel (flat form, `vendorId` identity).
	General,
}

impl ShopType {
	/// Decodes the stored integer representation.
	pub fn from_u8(v: u8) -> Option<Self> {
		match v {
			1 => Some(ShopType::Game),
			2 => Some(ShopType::General),
			_ => None,
		}
	}

	/// The integer stored in the relational store.
	pub fn as_u8(&self) -> u8 {
		match self {
			ShopType::Game => 1,
			ShopType::General => 2,
		}
	}
}

/// Which signing dialect the shop's inventory service speaks.
///
/// Selection is explicit per shop rather than inferred from which
/// credential fields happen to be populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryDialect {
	/// Bearer-token POST form, sign = MD5(secret + k1v1k2v2... + secret).
	Agiso,
	/// api_key/timestamp params, sign = MD5(k1=v1&...&secret=<secret>).
	Rest,
}

impl InventoryDialect {
	pub fn from_str_opt(v: &str) -> Option<Self> {
		match v {
			"agiso" => Some(InventoryDialect::Agiso),
			"rest" => Some(InventoryDialect::Rest),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			InventoryDialect::Agiso => "agiso",
			InventoryDialect::Rest => "rest",
		}
	}
}

/// A seller account on the upstream platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
	/// Stable numeric id.
	pub id: i64,
	/// Display name.
	pub shop_name: String,
	/// Unique shop code, also accepted as a secondary tenant identity.
	pub shop_code: String,
	/// Which channel this shop speaks.
	pub shop_type: ShopType,

	/// Game channel: customer id carried in the outer push form.
	pub game_customer_id: Option<String>,
	/// Game channel: MD5 secret; empty/absent disables verification.
	pub game_md5_secret: Option<String>,
	/// Game channel: callback URL for direct (top-up) orders.
	pub game_direct_callback_url: Option<String>,
	/// Game channel: callback URL for card-code orders.
	pub game_card_callback_url: Option<String>,
	/// Game channel: generic API URL, used when the per-type URLs are empty.
	pub game_api_url: Option<String>,

	/// General channel: vendor id carried in the push form.
	pub general_vendor_id: Option<String>,
	/// General channel: MD5 secret; empty/absent disables verification.
	pub general_md5_secret: Option<String>,
	/// General channel: AES key for the card payload (NUL-padded to 32 bytes).
	pub general_aes_secret: Option<String>,
	/// General channel: callback URL base.
	pub general_callback_url: Option<String>,

	/// Inventory service signing dialect.
	pub card91_dialect: Option<InventoryDialect>,
	/// Inventory service base URL.
	pub card91_api_url: Option<String>,
	/// Inventory service key (Agiso: bearer token; REST: api_key param).
	pub card91_api_key: Option<String>,
	/// Inventory service signing secret.
	pub card91_api_secret: Option<String>,

	/// Whether new-order notifications fire for this shop.
	pub notify_enabled: bool,
	/// DingTalk robot webhook URL.
	pub dingtalk_webhook: Option<String>,
	/// DingTalk robot signing secret (adds the timestamp HMAC when set).
	pub dingtalk_secret: Option<String>,
	/// WeCom robot webhook URL.
	pub wecom_webhook: Option<String>,

	/// Disabled shops are never resolved for inbound pushes.
	pub is_enabled: bool,
	/// Pushes after this instant are rejected.
	pub expire_time: Option<DateTime<Utc>>,

	pub create_time: DateTime<Utc>,
	pub update_time: DateTime<Utc>,
}

impl Shop {
	/// Whether the shop has expired relative to `now`.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		matches!(self.expire_time, Some(t) if t < now)
	}

	/// Whether the inventory credentials are complete enough to fetch cards.
	pub fn has_inventory_credentials(&self) -> bool {
		self.card91_dialect.is_some()
			&& self
				.card91_api_key
				.as_deref()
				.is_some_and(|k| !k.is_empty())
	}
}
