//! Dependency-tracking core of a dynamic component runtime.
//!
//! Each managed component declares dependencies on externally published
//! capabilities or discovered resources. The trackers here keep the
//! component's activation state synchronized with live availability while
//! the registry publishes, updates, and withdraws candidates concurrently:
//!
//! - [`DependencyState`] encodes required/optional against started/available.
//! - [`ResourceDependency`] tracks locator-addressed resources with a plain
//!   counting availability rule.
//! - [`CapabilityDependency`] tracks typed capability instances and resolves
//!   decoration chains by rank, delivering atomic swap notifications.
//!
//! Registry mechanics stay behind the `tether-registry` traits; consumers
//! plug in through [`DependencyConsumer`].

mod capability;
mod consumer;
mod error;
mod invoke;
mod resource;
mod state;

#[cfg(test)]
mod tests;

pub use capability::{CapabilityDependency, CapabilityPropsTransform, DefaultImplementation};
pub use consumer::{Dependency, DependencyConsumer};
pub use error::{ConfigError, PropsError};
pub use invoke::{
	CallbackCall, CallbackTarget, Callbacks, CandidateRef, ComponentCtx, InstanceRef,
	InvokeOutcome, deliver,
};
pub use resource::{ResourceDependency, ResourcePropsTransform};
pub use state::DependencyState;
pub use tether_registry::TrackingFault;
