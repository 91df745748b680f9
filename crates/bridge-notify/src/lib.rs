//! Human notification fan-out for the order bridge.
//!
//! After a new order is ingested the engine enqueues a notification;
//! delivery runs on a bounded worker pool, completely decoupled from
//! the inbound HTTP reply. Two webhook dialects are supported (DingTalk
//! and WeCom robots), retried independently up to three times with
//! backoffs from a fixed table. Every attempt writes one log row, and
//! the order's `notified` flag is set after the final attempt whether
//! or not any channel succeeded.

/// Webhook senders for the two robot dialects.
pub mod channels;
/// Notification message body builder.
pub mod message;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use bridge_store::StoreService;
use bridge_types::{NotificationLogDraft, NotifyChannel, Order, Shop};

/// Retry backoff table; one entry per attempt, slept after a failure
/// when another attempt remains.
pub const RETRY_BACKOFF_SECONDS: [u64; 3] = [1, 3, 5];

/// Errors surfaced by notification delivery.
#[derive(Debug, Error)]
pub enum NotifyError {
	#[error("no notification channel configured")]
	NoChannel,
	#[error("network error: {0}")]
	Network(String),
	#[error("webhook rejected message: {0}")]
	Rejected(String),
	#[error("store error: {0}")]
	Store(String),
}

/// One queued dispatch.
#[derive(Debug, Clone)]
pub struct NotifyJob {
	pub order_id: i64,
	pub shop_id: i64,
}

/// Tuning knobs for the worker pool.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
	pub workers: usize,
	pub queue_capacity: usize,
	pub webhook_timeout: Duration,
	/// Backoff between attempts; length bounds the attempt count.
	pub backoff: Vec<Duration>,
}

impl Default for NotifierSettings {
	fn default() -> Self {
		Self {
			workers: 4,
			queue_capacity: 256,
			webhook_timeout: Duration::from_secs(10),
			backoff: RETRY_BACKOFF_SECONDS
				.iter()
				.map(|s| Duration::from_secs(*s))
				.collect(),
		}
	}
}

/// Handle used by request handlers to enqueue notifications.
#[derive(Clone)]
pub struct Notifier {
	sender: mpsc::Sender<NotifyJob>,
}

impl Notifier {
	/// Starts the worker pool and returns the enqueue handle.
	pub fn start(
		store: Arc<StoreService>,
		http: reqwest::Client,
		settings: NotifierSettings,
	) -> Self {
		let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
		let receiver = Arc::new(Mutex::new(receiver));

		for worker in 0..settings.workers.max(1) {
			let receiver = Arc::clone(&receiver);
			let store = Arc::clone(&store);
			let http = http.clone();
			let settings = settings.clone();
			tokio::spawn(async move {
				loop {
					let job = { receiver.lock().await.recv().await };
					let Some(job) = job else { break };
					if let Err(e) = process_job(&store, &http, &settings, &job).await {
						tracing::warn!(
							worker,
							order_id = job.order_id,
							"notification dispatch failed: {}",
							e
						);
					}
				}
			});
		}

		Self { sender }
	}

	/// Enqueues a dispatch without blocking the caller.
	///
	/// A full queue drops the job with a warning; order state is never
	/// held hostage by notification throughput.
	pub fn dispatch(&self, order: &Order, shop: &Shop) {
		if !shop.notify_enabled || channels_for(shop).is_empty() {
			return;
		}
		let job = NotifyJob {
			order_id: order.id,
			shop_id: shop.id,
		};
		if let Err(e) = self.sender.try_send(job) {
			tracing::warn!(order_no = %order.order_no, "notification queue full: {}", e);
		}
	}
}

/// Channels a shop has configured.
pub fn channels_for(shop: &Shop) -> Vec<NotifyChannel> {
	let mut channels = Vec::new();
	if shop
		.dingtalk_webhook
		.as_deref()
		.is_some_and(|u| !u.is_empty())
	{
		channels.push(NotifyChannel::Dingtalk);
	}
	if shop.wecom_webhook.as_deref().is_some_and(|u| !u.is_empty()) {
		channels.push(NotifyChannel::Wecom);
	}
	channels
}

async fn process_job(
	store: &StoreService,
	http: &reqwest::Client,
	settings: &NotifierSettings,
	job: &NotifyJob,
) -> Result<(), NotifyError> {
	let order = store
		.backend()
		.order_by_id(job.order_id)
		.await
		.map_err(|e| NotifyError::Store(e.to_string()))?;
	let shop = store
		.backend()
		.shop_by_id(job.shop_id)
		.await
		.map_err(|e| NotifyError::Store(e.to_string()))?;

	let text = message::build_order_message(&order, &shop);

	for channel in channels_for(&shop) {
		deliver_with_retry(store, http, settings, &order, &shop, channel, &text).await;
	}

	// The flag flips after the final attempt regardless of success.
	store
		.backend()
		.mark_notified(order.id)
		.await
		.map_err(|e| NotifyError::Store(e.to_string()))?;
	Ok(())
}

async fn deliver_with_retry(
	store: &StoreService,
	http: &reqwest::Client,
	settings: &NotifierSettings,
	order: &Order,
	shop: &Shop,
	channel: NotifyChannel,
	text: &str,
) {
	let attempts = settings.backoff.len().max(1);
	for attempt in 1..=attempts {
		let outcome =
			channels::send(http, settings.webhook_timeout, shop, channel, text).await;
		let success = outcome.is_ok();
		log_attempt(store, order, shop, channel, attempt as u32, text, &outcome).await;

		if success {
			return;
		}
		if attempt < attempts {
			tokio::time::sleep(settings.backoff[attempt - 1]).await;
		}
	}
}

async fn log_attempt(
	store: &StoreService,
	order: &Order,
	shop: &Shop,
	channel: NotifyChannel,
	attempt: u32,
	text: &str,
	outcome: &Result<String, NotifyError>,
) {
	let (success, response, error) = match outcome {
		Ok(body) => (true, Some(body.clone()), None),
		Err(e) => (false, None, Some(e.to_string())),
	};
	let draft = NotificationLogDraft {
		order_id: order.id,
		shop_id: shop.id,
		channel,
		success,
		attempt,
		request_data: Some(text.chars().take(500).collect()),
		response_data: response.map(|r| r.chars().take(2000).collect()),
		error_message: error,
	};
	if let Err(e) = store.backend().append_notification_log(&draft).await {
		tracing::warn!(order_no = %order.order_no, "notification log dropped: {}", e);
	}
}

/// Re-sends one notification from an existing log row.
///
/// The original row is never mutated; the single new attempt appends
/// its own row and the classified outcome is returned.
pub async fn resend_from_log(
	store: &StoreService,
	http: &reqwest::Client,
	settings: &NotifierSettings,
	log_id: i64,
) -> Result<bool, NotifyError> {
	let log = store
		.backend()
		.notification_log_by_id(log_id)
		.await
		.map_err(|e| NotifyError::Store(e.to_string()))?;
	let order = store
		.backend()
		.order_by_id(log.order_id)
		.await
		.map_err(|e| NotifyError::Store(e.to_string()))?;
	let shop = store
		.backend()
		.shop_by_id(log.shop_id)
		.await
		.map_err(|e| NotifyError::Store(e.to_string()))?;

	let text = message::build_order_message(&order, &shop);
	let outcome = channels::send(http, settings.webhook_timeout, &shop, log.channel, &text).await;
	let success = outcome.is_ok();
	log_attempt(store, &order, &shop, log.channel, 1, &text, &outcome).await;
	Ok(success)
}

/// Sends a test message to one channel of a shop.
pub async fn send_test(
	http: &reqwest::Client,
	settings: &NotifierSettings,
	shop: &Shop,
	channel: NotifyChannel,
) -> Result<(), NotifyError> {
	let text = message::build_test_message(shop, channel);
	channels::send(http, settings.webhook_timeout, shop, channel, &text).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_store::implementations::memory::MemoryStore;
	use bridge_store::StoreInterface;
	use bridge_types::{
		generate_order_no, now_utc, InventoryDialect, OrderDraft, OrderType, ShopType,
	};
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn test_settings() -> NotifierSettings {
		NotifierSettings {
			workers: 1,
			queue_capacity: 8,
			webhook_timeout: Duration::from_secs(2),
			backoff: vec![Duration::ZERO, Duration::ZERO, Duration::ZERO],
		}
	}

	fn shop(wecom: Option<String>) -> Shop {
		let now = now_utc();
		Shop {
			id: 0,
			shop_name: "Notify shop".to_string(),
			shop_code: "NTF01".to_string(),
			shop_type: ShopType::Game,
			game_customer_id: None,
			game_md5_secret: None,
			game_direct_callback_url: None,
			game_card_callback_url: None,
			game_api_url: None,
			general_vendor_id: None,
			general_md5_secret: None,
			general_aes_secret: None,
			general_callback_url: None,
			card91_dialect: None::<InventoryDialect>,
			card91_api_url: None,
			card91_api_key: None,
			card91_api_secret: None,
			notify_enabled: true,
			dingtalk_webhook: None,
			dingtalk_secret: None,
			wecom_webhook: wecom,
			is_enabled: true,
			expire_time: None,
			create_time: now,
			update_time: now,
		}
	}

	async fn seeded(wecom_url: String) -> (Arc<StoreService>, Order, Shop) {
		let memory = MemoryStore::new();
		let shop_id = memory.insert_shop(&shop(Some(wecom_url))).await.unwrap();
		let (order, _) = memory
			.insert_order_if_absent(&OrderDraft {
				order_no: generate_order_no(),
				jd_order_no: "JDN1".to_string(),
				shop_id,
				shop_type: ShopType::Game,
				order_type: OrderType::Direct,
				sku_id: None,
				product_info: Some("demo".to_string()),
				amount: 150,
				quantity: 1,
				produce_account: None,
				notify_url: None,
			})
			.await
			.unwrap();
		let shop = memory.shop_by_id(shop_id).await.unwrap();
		let store = Arc::new(StoreService::new(Box::new(memory)));
		(store, order, shop)
	}

	#[tokio::test]
	async fn success_logs_one_row_and_marks_notified() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/hook"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(serde_json::json!({"errcode": 0})),
			)
			.mount(&server)
			.await;

		let (store, order, shop) = seeded(format!("{}/hook", server.uri())).await;
		let notifier = Notifier::start(
			Arc::clone(&store),
			reqwest::Client::new(),
			test_settings(),
		);
		notifier.dispatch(&order, &shop);

		// Drain: wait for the worker to flip the flag.
		for _ in 0..50 {
			if store.backend().order_by_id(order.id).await.unwrap().notified {
				break;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}

		let stored = store.backend().order_by_id(order.id).await.unwrap();
		assert!(stored.notified);
		assert_eq!(server.received_requests().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn failure_retries_three_times_then_still_marks_notified() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/hook"))
			.respond_with(ResponseTemplate::new(200).set_body_json(
				serde_json::json!({"errcode": 93000, "errmsg": "invalid webhook"}),
			))
			.mount(&server)
			.await;

		let (store, order, shop) = seeded(format!("{}/hook", server.uri())).await;
		let notifier = Notifier::start(
			Arc::clone(&store),
			reqwest::Client::new(),
			test_settings(),
		);
		notifier.dispatch(&order, &shop);

		for _ in 0..50 {
			if store.backend().order_by_id(order.id).await.unwrap().notified {
				break;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}

		let stored = store.backend().order_by_id(order.id).await.unwrap();
		assert!(stored.notified);
		assert_eq!(server.received_requests().await.unwrap().len(), 3);
	}

	#[tokio::test]
	async fn disabled_shop_is_never_dispatched() {
		let (store, order, mut shop) = seeded("http://unused.invalid/hook".to_string()).await;
		shop.notify_enabled = false;
		let notifier = Notifier::start(
			Arc::clone(&store),
			reqwest::Client::new(),
			test_settings(),
		);
		notifier.dispatch(&order, &shop);

		tokio::time::sleep(Duration::from_millis(100)).await;
		let stored = store.backend().order_by_id(order.id).await.unwrap();
		assert!(!stored.notified);
	}
}
