//! Card-code shapes and the field-alias normalization table.
//!
//! Card codes cross four boundaries, each with its own field spelling:
//! the inventory service returns `cardNo`/`cardPwd`, the game channel
//! wants `cardNo`/`cardPass` in queries but lower-case `cardno`/`cardpass`
//! in callbacks, and the general channel wants `cardNumber`/`password`/
//! `expiryDate`. The internal shape is canonical; everything inbound is
//! folded through a fixed alias table.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default expiry used when the source carries none.
const DEFAULT_EXPIRY: &str = "2099-12-31";

/// Canonical internal card code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCode {
	#[serde(rename = "cardNo")]
	pub card_no: String,
	#[serde(rename = "cardPwd")]
	pub card_pwd: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expiry: Option<String>,
}

/// Accepted spellings for the card number field.
const NO_ALIASES: &[&str] = &["cardNo", "card_no", "cardNumber", "cardno", "c"];
/// Accepted spellings for the card password field.
const PWD_ALIASES: &[&str] = &[
	"cardPwd", "card_pwd", "cardPass", "cardpass", "password", "p",
];
/// Accepted spellings for the expiry field.
const EXPIRY_ALIASES: &[&str] = &["expiry", "expiryDate", "expire_date", "d"];

fn pick<'a>(obj: &'a serde_json::Map<String, Value>, aliases: &[&str]) -> Option<&'a str> {
	aliases
		.iter()
		.filter_map(|k| obj.get(*k))
		.find_map(|v| v.as_str())
		.filter(|s| !s.is_empty())
}

impl CardCode {
	pub fn new(card_no: impl Into<String>, card_pwd: impl Into<String>) -> Self {
		Self {
			card_no: card_no.into(),
			card_pwd: card_pwd.into(),
			expiry: None,
		}
	}

	/// Folds one JSON object through the alias table.
	///
	/// Returns `None` when no recognizable card number is present.
	pub fn from_value(v: &Value) -> Option<Self> {
		let obj = v.as_object()?;
		let card_no = pick(obj, NO_ALIASES)?.to_string();
		let card_pwd = pick(obj, PWD_ALIASES).unwrap_or_default().to_string();
		let expiry = pick(obj, EXPIRY_ALIASES).map(String::from);
		Some(Self {
			card_no,
			card_pwd,
			expiry,
		})
	}

	/// Parses a stored JSON array, skipping unrecognizable entries.
	pub fn parse_list(raw: &str) -> Vec<CardCode> {
		serde_json::from_str::<Value>(raw)
			.ok()
			.and_then(|v| v.as_array().cloned())
			.map(|items| items.iter().filter_map(CardCode::from_value).collect())
			.unwrap_or_default()
	}

	/// Game query shape: `{cardNo, cardPass}`.
	pub fn to_game_query(&self) -> Value {
		json!({ "cardNo": self.card_no, "cardPass": self.card_pwd })
	}

	/// Game callback shape, lower-case field names per protocol.
	pub fn to_game_callback(&self) -> Value {
		json!({ "cardno": self.card_no, "cardpass": self.card_pwd })
	}

	/// General channel shape: `{cardNumber, password, expiryDate}`.
	pub fn to_general(&self) -> Value {
		json!({
			"cardNumber": self.card_no,
			"password": self.card_pwd,
			"expiryDate": self.expiry.as_deref().unwrap_or(DEFAULT_EXPIRY),
		})
	}
}

/// Serializes cards for the general `product` payload.
pub fn cards_to_general_json(cards: &[CardCode]) -> String {
	let items: Vec<Value> = cards.iter().map(CardCode::to_general).collect();
	serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string())
}

/// Serializes cards for storage in the order's `card_info` column.
pub fn cards_to_stored_json(cards: &[CardCode]) -> String {
	serde_json::to_string(cards).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn alias_table_folds_every_spelling() {
		let variants = [
			r#"{"cardNo":"N","cardPwd":"P"}"#,
			r#"{"card_no":"N","card_pwd":"P"}"#,
			r#"{"cardNumber":"N","password":"P"}"#,
			r#"{"cardno":"N","cardpass":"P"}"#,
			r#"{"c":"N","p":"P"}"#,
		];
		for raw in variants {
			let v: Value = serde_json::from_str(raw).unwrap();
			let card = CardCode::from_value(&v).expect(raw);
			assert_eq!(card.card_no, "N");
			assert_eq!(card.card_pwd, "P");
		}
	}

	#[test]
	fn parse_list_skips_garbage() {
		let cards = CardCode::parse_list(r#"[{"cardNo":"A","cardPwd":"x"},{"noise":1},42]"#);
		assert_eq!(cards.len(), 1);
		assert_eq!(cards[0].card_no, "A");
		assert!(CardCode::parse_list("not json").is_empty());
	}

	#[test]
	fn general_shape_defaults_expiry() {
		let card = CardCode::new("N1", "P1");
		let v = card.to_general();
		assert_eq!(v["expiryDate"], "2099-12-31");

		let mut dated = CardCode::new("N2", "P2");
		dated.expiry = Some("2030-01-01".to_string());
		assert_eq!(dated.to_general()["expiryDate"], "2030-01-01");
	}

	#[test]
	fn callback_shape_is_lower_case() {
		let v = CardCode::new("N", "P").to_game_callback();
		assert!(v.get("cardno").is_some());
		assert!(v.get("cardNo").is_none());
	}

	#[test]
	fn stored_json_round_trips() {
		let cards = vec![CardCode::new("A", "1"), CardCode::new("B", "2")];
		let raw = cards_to_stored_json(&cards);
		assert_eq!(CardCode::parse_list(&raw), cards);
	}
}
