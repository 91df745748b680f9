//! Store/engine/notifier assembly from configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_callback::CallbackClient;
use bridge_config::Config;
use bridge_engine::FulfillmentEngine;
use bridge_notify::{Notifier, NotifierSettings, RETRY_BACKOFF_SECONDS};
use bridge_store::{StoreFactory, StoreService};

use crate::server::AppState;

/// Builds the configured store backend.
pub fn build_store(config: &Config) -> Result<StoreService, Box<dyn std::error::Error>> {
	let factories: HashMap<&'static str, StoreFactory> =
		bridge_store::get_all_implementations().into_iter().collect();
	let factory = factories
		.get(config.store.primary.as_str())
		.ok_or_else(|| format!("unknown store implementation '{}'", config.store.primary))?;

	let section = config
		.store
		.implementations
		.get(&config.store.primary)
		.cloned()
		.unwrap_or(toml::Value::Table(toml::map::Map::new()));

	let backend = factory(&section)?;
	Ok(StoreService::new(backend))
}

/// Wires the engine and notifier around a store.
pub fn build_state(
	config: &Config,
	store: Arc<StoreService>,
) -> Result<AppState, Box<dyn std::error::Error>> {
	// One pooled client shared by callbacks, inventory and webhooks.
	let http = reqwest::Client::builder()
		.pool_idle_timeout(Duration::from_secs(90))
		.pool_max_idle_per_host(10)
		.build()?;

	let engine = FulfillmentEngine::new(
		Arc::clone(&store),
		CallbackClient::new(http.clone()),
		http.clone(),
	);

	let settings = NotifierSettings {
		workers: config.notifier.workers,
		queue_capacity: config.notifier.queue_capacity,
		webhook_timeout: Duration::from_secs(config.http.webhook_timeout_seconds),
		backoff: RETRY_BACKOFF_SECONDS
			.iter()
			.map(|s| Duration::from_secs(*s))
			.collect(),
	};
	let notifier = Notifier::start(Arc::clone(&store), http, settings);

	Ok(AppState {
		store,
		engine,
		notifier,
	})
}
