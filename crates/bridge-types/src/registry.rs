//! Registry trait for self-registering implementations.
//!
//! Pluggable backends (store, inventory dialects) register themselves
//! under the name used in configuration, together with a factory that
//! builds them from their TOML section.

/// Base trait for implementation registries.
///
/// Each pluggable module provides a `Registry` struct implementing this
/// trait, tying the configuration name to a factory function:
/// - "sqlite" / "memory" for store.implementations.*
/// - "agiso" / "rest" for the inventory dialects
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds instances of this implementation.
	fn factory() -> Self::Factory;
}
