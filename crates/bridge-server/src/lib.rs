//! HTTP surface of the order bridge.
//!
//! Exposes the platform-facing ingestion and query endpoints for both
//! channels, the request logging layer, and the wiring that assembles
//! store, engine and notifier into a running server. The binary in
//! `main.rs` is a thin clap wrapper around [`bootstrap`] and
//! [`server::start_server`].

/// Request logging middleware.
pub mod apilog;
/// Channel endpoint handlers.
pub mod apis;
/// Store/engine/notifier assembly from configuration.
pub mod bootstrap;
/// Router construction and server startup.
pub mod server;
