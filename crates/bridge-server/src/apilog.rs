//! Request logging middleware.
//!
//! Every inbound ingestion request under `/api/` is recorded with
//! truncated request and response bodies. Query (poll) endpoints are
//! exempt; the platforms poll aggressively and the rows would drown
//! the log. Failures to write the row never affect the reply.

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::server::AppState;
use bridge_types::{truncate_body, ApiLogDraft};

/// Upper bound on buffered bodies; pushes are small form posts.
const BODY_LIMIT: usize = 1024 * 1024;

fn api_type_of(path: &str) -> Option<String> {
	let rest = path.strip_prefix("/api/")?;
	if rest.contains("query") {
		// Poll endpoints are not logged.
		return None;
	}
	Some(rest.replace('/', "_"))
}

/// Buffers the request and response around the inner handler and
/// appends one api log row.
pub async fn api_log_layer(
	State(state): State<AppState>,
	request: Request,
	next: Next,
) -> Result<Response, StatusCode> {
	let path = request.uri().path().to_string();
	let Some(api_type) = api_type_of(&path) else {
		return Ok(next.run(request).await);
	};

	let method = request.method().to_string();
	let url = request
		.uri()
		.path_and_query()
		.map(|pq| pq.to_string())
		.unwrap_or(path);
	// Absent when the router is driven directly in tests.
	let ip_address = request
		.extensions()
		.get::<ConnectInfo<SocketAddr>>()
		.map(|ConnectInfo(addr)| addr.ip().to_string());

	let (parts, body) = request.into_parts();
	let request_bytes = to_bytes(body, BODY_LIMIT)
		.await
		.map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;
	let request_body = String::from_utf8_lossy(&request_bytes).into_owned();
	let request = Request::from_parts(parts, Body::from(request_bytes));

	let response = next.run(request).await;

	let status = response.status();
	let (parts, body) = response.into_parts();
	let response_bytes = to_bytes(body, BODY_LIMIT)
		.await
		.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
	let response_body = String::from_utf8_lossy(&response_bytes).into_owned();

	let draft = ApiLogDraft {
		shop_id: None,
		api_type,
		request_method: method,
		request_url: url,
		request_body: Some(truncate_body(&request_body)),
		response_status: status.as_u16(),
		response_body: Some(truncate_body(&response_body)),
		ip_address,
	};
	if let Err(e) = state.store.backend().append_api_log(&draft).await {
		tracing::warn!("api log dropped: {}", e);
	}

	Ok(Response::from_parts(parts, Body::from(response_bytes)))
}
