//! Router construction and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use bridge_config::Config;
use bridge_engine::FulfillmentEngine;
use bridge_notify::Notifier;
use bridge_store::StoreService;

use crate::apis::game as apis_game;
use crate::apis::general as apis_general;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Persistence service.
	pub store: Arc<StoreService>,
	/// Fulfillment engine driving state transitions.
	pub engine: FulfillmentEngine,
	/// Background notification fan-out handle.
	pub notifier: Notifier,
}

/// Builds the complete API router.
pub fn build_router(state: AppState) -> Router {
	let game = Router::new()
		.route("/direct", post(apis_game::direct_push))
		.route("/card", post(apis_game::card_push))
		.route(
			"/query",
			get(apis_game::direct_query_get).post(apis_game::direct_query_post),
		)
		.route(
			"/card-query",
			get(apis_game::card_query_get).post(apis_game::card_query_post),
		);

	let general = Router::new()
		.route("/distill", post(apis_general::distill))
		.route(
			"/query",
			get(apis_general::query_get).post(apis_general::query_post),
		);

	Router::new()
		.nest("/api/game", game)
		.nest("/api/general", general)
		.layer(
			ServiceBuilder::new()
				.layer(CorsLayer::permissive())
				.layer(middleware::from_fn_with_state(
					state.clone(),
					crate::apilog::api_log_layer,
				)),
		)
		.with_state(state)
}

/// Starts the HTTP server and serves until shutdown.
pub async fn start_server(
	config: &Config,
	state: AppState,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = build_router(state);

	let bind_address = format!("{}:{}", config.server.host, config.server.port);
	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!("order bridge API listening on {}", bind_address);

	// Peer addresses only reach the request-log layer when the service
	// is built with connect info.
	axum::serve(
		listener,
		app.into_make_service_with_connect_info::<SocketAddr>(),
	)
	.with_graceful_shutdown(async {
		let _ = tokio::signal::ctrl_c().await;
		tracing::info!("shutting down API server");
	})
	.await?;

	Ok(())
}
