//! Timestamp helpers for storage (UTC) and wire (local) clocks.
//!
//! Everything persisted is UTC. The platform protocols want local
//! wall-clock `YYYYmmddHHMMSS` strings in callbacks and signed replies,
//! so formatting as local happens only at the wire boundary.

use chrono::{DateTime, Local, Utc};

/// Current UTC instant for storage timestamps.
pub fn now_utc() -> DateTime<Utc> {
	Utc::now()
}

/// Current unix timestamp in seconds, 0 if the clock is before the epoch.
pub fn unix_timestamp() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Local wall-clock `YYYYmmddHHMMSS` string for signed wire payloads.
pub fn wire_timestamp() -> String {
	Local::now().format("%Y%m%d%H%M%S").to_string()
}
