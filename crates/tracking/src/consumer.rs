//! The contract between a dependency and its owning component.

use std::sync::Arc;

use tether_registry::{Instance, ResourceProps};

use crate::error::PropsError;
use crate::invoke::{CallbackCall, CallbackTarget};
use crate::state::DependencyState;

/// What a consumer can observe about one of its dependencies.
pub trait Dependency: Send + Sync {
	fn state(&self) -> DependencyState;
	fn is_required(&self) -> bool;
	fn is_instance_bound(&self) -> bool;
	fn is_available(&self) -> bool;
	fn is_auto_config(&self) -> bool;
	/// Field the bound value is injected into when auto-configuration names
	/// one.
	fn auto_config_field(&self) -> Option<String>;
	fn is_propagated(&self) -> bool;
	/// Properties this dependency contributes to the component's own
	/// publication when propagation is on.
	fn properties(&self) -> Result<ResourceProps, PropsError>;
	/// Human-readable identification for status reports.
	fn name(&self) -> String;
	/// Dependency category: `"capability"` or `"resource"`.
	fn kind(&self) -> &'static str;
}

/// The owning component instance that registered interest in a dependency.
///
/// Lifecycle notifications arrive synchronously on the registry's delivery
/// thread, in consumer registration order. Implementations must not assume a
/// particular thread.
pub trait DependencyConsumer: Send + Sync {
	/// The dependency transitioned to available.
	fn dependency_available(&self, dependency: &dyn Dependency);

	/// The dependency transitioned to unavailable.
	fn dependency_unavailable(&self, dependency: &dyn Dependency);

	/// The dependency changed without an availability transition.
	fn dependency_changed(&self, dependency: &dyn Dependency);

	/// Whether the component has been instantiated.
	fn is_instantiated(&self) -> bool;

	/// Whether the component is currently published to others.
	fn is_registered(&self) -> bool;

	/// Instances receiving user-declared callbacks, in composition order.
	fn composition_targets(&self) -> Vec<Arc<dyn CallbackTarget>>;

	/// Opaque component context handed to user callbacks that ask for it.
	fn component(&self) -> Instance;

	/// Delivers a user callback. The default walks the targets in order,
	/// offering each the argument shapes richest-first.
	fn invoke_callback_method(
		&self,
		targets: &[Arc<dyn CallbackTarget>],
		name: &str,
		calls: &[CallbackCall<'_>],
	) {
		crate::invoke::deliver(targets, name, calls);
	}
}

/// Identity of a registered consumer, keyed by allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ConsumerKey(usize);

impl ConsumerKey {
	pub fn of(consumer: &Arc<dyn DependencyConsumer>) -> Self {
		Self(Arc::as_ptr(consumer) as *const () as usize)
	}
}
