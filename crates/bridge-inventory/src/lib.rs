//! Card inventory client for the order bridge.
//!
//! Outbound signed RPC to the third-party card warehouse ("91") the
//! engine draws codes from. Two wire dialects exist in the field and
//! both are supported; the choice is explicit per shop configuration
//! rather than inferred from which credential fields are populated.
//!
//! The engine-facing contract is strict: a fetch either yields exactly
//! the requested number of cards or fails; partial fulfillment is
//! never handed upward.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bridge_types::{CardCode, InventoryDialect, Shop};

/// Re-export implementations
pub mod implementations {
	pub mod agiso;
	pub mod rest;
}

/// Timeout for inventory RPCs.
pub const INVENTORY_TIMEOUT_SECONDS: u64 = 30;

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
	/// Shop configuration is missing dialect or credentials.
	#[error("Inventory not configured: {0}")]
	NotConfigured(String),
	/// Network-level failure reaching the service.
	#[error("Network error: {0}")]
	Network(String),
	/// The service answered with a protocol-level error.
	#[error("Inventory service error: {0}")]
	Service(String),
	/// The reply could not be parsed.
	#[error("Parse error: {0}")]
	Parse(String),
	/// Fewer cards were returned than requested.
	#[error("Inventory shortfall: requested {requested}, received {received}")]
	Shortfall { requested: usize, received: usize },
	/// The requested card type is unknown to the service.
	#[error("Unknown card type: {0}")]
	UnknownCardType(String),
}

/// One card type (SKU) on the inventory side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardType {
	pub id: String,
	pub name: String,
	pub stock: i64,
	pub total: i64,
	pub used: i64,
}

/// Trait defining the interface for inventory dialects.
#[async_trait]
pub trait InventoryInterface: Send + Sync {
	/// Lists the card types visible to these credentials.
	async fn list_card_types(&self) -> Result<Vec<CardType>, InventoryError>;

	/// Fetches up to `quantity` cards for `card_type_id`.
	///
	/// `order_no` is the idempotency key the service deduplicates on, so
	/// a retry for the same order never double-picks. Implementations
	/// return whatever the service produced; the count guarantee is
	/// enforced by [`InventoryService::fetch_exact`].
	async fn fetch_cards(
		&self,
		card_type_id: &str,
		quantity: usize,
		order_no: &str,
	) -> Result<Vec<CardCode>, InventoryError>;
}

/// Per-shop inventory client with the quantity guarantee.
pub struct InventoryService {
	dialect: Box<dyn InventoryInterface>,
}

impl InventoryService {
	/// Builds the dialect client for a shop's credentials.
	pub fn for_shop(shop: &Shop, http: reqwest::Client) -> Result<Self, InventoryError> {
		let dialect = shop.card91_dialect.ok_or_else(|| {
			InventoryError::NotConfigured("no inventory dialect selected".to_string())
		})?;
		let api_key = shop
			.card91_api_key
			.clone()
			.filter(|k| !k.is_empty())
			.ok_or_else(|| {
				InventoryError::NotConfigured("missing inventory api key".to_string())
			})?;
		let api_secret = shop.card91_api_secret.clone().unwrap_or_default();
		let api_url = shop.card91_api_url.clone().filter(|u| !u.is_empty());

		let client: Box<dyn InventoryInterface> = match dialect {
			InventoryDialect::Agiso => Box::new(implementations::agiso::AgisoClient::new(
				api_url,
				api_key,
				api_secret,
				http,
			)),
			InventoryDialect::Rest => {
				let url = api_url.ok_or_else(|| {
					InventoryError::NotConfigured(
						"REST inventory dialect requires an api url".to_string(),
					)
				})?;
				Box::new(implementations::rest::RestClient::new(
					url, api_key, api_secret, http,
				))
			}
		};
		Ok(Self { dialect: client })
	}

	/// Wraps an already-built dialect client (used by tests).
	pub fn from_dialect(dialect: Box<dyn InventoryInterface>) -> Self {
		Self { dialect }
	}

	/// Lists card types.
	pub async fn list_card_types(&self) -> Result<Vec<CardType>, InventoryError> {
		self.dialect.list_card_types().await
	}

	/// Remaining stock for one card type, derived from the listing.
	pub async fn get_stock(&self, card_type_id: &str) -> Result<i64, InventoryError> {
		let types = self.dialect.list_card_types().await?;
		types
			.into_iter()
			.find(|t| t.id == card_type_id)
			.map(|t| t.stock)
			.ok_or_else(|| InventoryError::UnknownCardType(card_type_id.to_string()))
	}

	/// Fetches exactly `quantity` cards or fails.
	///
	/// Oversupply is truncated to the requested count; undersupply is a
	/// [`InventoryError::Shortfall`] and no cards are handed to the
	/// caller.
	pub async fn fetch_exact(
		&self,
		card_type_id: &str,
		quantity: usize,
		order_no: &str,
	) -> Result<Vec<CardCode>, InventoryError> {
		let mut cards = self
			.dialect
			.fetch_cards(card_type_id, quantity, order_no)
			.await?;
		if cards.len() < quantity {
			return Err(InventoryError::Shortfall {
				requested: quantity,
				received: cards.len(),
			});
		}
		cards.truncate(quantity);
		Ok(cards)
	}

	/// Lightweight connectivity probe, used by operator tooling.
	pub async fn test_connection(&self) -> Result<usize, InventoryError> {
		Ok(self.dialect.list_card_types().await?.len())
	}
}
