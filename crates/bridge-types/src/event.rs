//! Order event log types.
//!
//! Every state-affecting action on an order appends exactly one event:
//! creation, status changes, inventory fetches, deliveries, callbacks
//! and errors. Events are never mutated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of an order event.
///
/// The wire strings are stable; the inventory-related kinds keep the
/// `card91_` prefix the rest of the system keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
	OrderCreated,
	StatusChanged,
	/// Cards were requested from the inventory service.
	InventoryFetch,
	/// Cards were delivered automatically after an inventory fetch.
	AutoDeliver,
	/// An operator delivered cards by hand.
	ManualDeliver,
	/// A direct (top-up) order was reported fulfilled.
	DirectCharge,
	/// The platform acknowledged a success callback.
	NotifySuccess,
	/// A refund callback was issued.
	NotifyRefund,
	Error,
}

impl EventType {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventType::OrderCreated => "order_created",
			EventType::StatusChanged => "status_changed",
			EventType::InventoryFetch => "card91_fetch",
			EventType::AutoDeliver => "card91_deliver",
			EventType::ManualDeliver => "manual_deliver",
			EventType::DirectCharge => "direct_charge",
			EventType::NotifySuccess => "notify_success",
			EventType::NotifyRefund => "notify_refund",
			EventType::Error => "error",
		}
	}

	pub fn from_str_opt(v: &str) -> Option<Self> {
		match v {
			"order_created" => Some(EventType::OrderCreated),
			"status_changed" => Some(EventType::StatusChanged),
			"card91_fetch" => Some(EventType::InventoryFetch),
			"card91_deliver" => Some(EventType::AutoDeliver),
			"manual_deliver" => Some(EventType::ManualDeliver),
			"direct_charge" => Some(EventType::DirectCharge),
			"notify_success" => Some(EventType::NotifySuccess),
			"notify_refund" => Some(EventType::NotifyRefund),
			"error" => Some(EventType::Error),
			_ => None,
		}
	}
}

/// Outcome classification of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventResult {
	Success,
	Failed,
	Info,
}

impl EventResult {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventResult::Success => "success",
			EventResult::Failed => "failed",
			EventResult::Info => "info",
		}
	}

	pub fn from_str_opt(v: &str) -> Option<Self> {
		match v {
			"success" => Some(EventResult::Success),
			"failed" => Some(EventResult::Failed),
			"info" => Some(EventResult::Info),
			_ => None,
		}
	}
}

/// One row of the append-only order event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
	pub id: i64,
	pub order_id: i64,
	/// Internal order number, denormalized for log queries.
	pub order_no: String,
	pub event_type: EventType,
	pub event_desc: String,
	/// Optional structured detail as JSON.
	pub event_data: Option<String>,
	/// Operator name for manual actions; `None` for system events.
	pub operator: Option<String>,
	pub result: EventResult,
	pub create_time: DateTime<Utc>,
}

/// The fields callers provide when appending an event.
#[derive(Debug, Clone)]
pub struct EventDraft {
	pub event_type: EventType,
	pub event_desc: String,
	pub event_data: Option<serde_json::Value>,
	pub operator: Option<String>,
	pub result: EventResult,
}

impl EventDraft {
	pub fn new(event_type: EventType, desc: impl Into<String>, result: EventResult) -> Self {
		Self {
			event_type,
			event_desc: desc.into(),
			event_data: None,
			operator: None,
			result,
		}
	}

	pub fn with_data(mut self, data: serde_json::Value) -> Self {
		self.event_data = Some(data);
		self
	}

	pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
		self.operator = Some(operator.into());
		self
	}
}
