//! Error taxonomy for dependency configuration and propagation.

use tether_registry::FilterParseError;

/// Rejected configuration. Raised synchronously by the configuration
/// surface; never by notification processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
	/// The subscription is open; configuration is frozen until the last
	/// consumer stops the dependency.
	#[error("dependency is already active; configuration is frozen while tracking runs")]
	AlreadyActive,
	/// `start` was called with no capability type, filter, or pinned handle
	/// declared.
	#[error("no capability type, filter, or pinned handle configured")]
	NothingSelected,
	#[error("invalid filter expression: {0}")]
	InvalidFilter(#[from] FilterParseError),
}

/// Failure computing propagated properties. Local to the property
/// computation; never aborts notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum PropsError {
	#[error("nothing is bound; propagated properties are unavailable")]
	NothingBound,
	#[error("propagation transform failed")]
	Transform(#[source] Box<dyn std::error::Error + Send + Sync>),
}
