//! Resource-locator-backed dependency tracking.
//!
//! Applies the dependency lifecycle contract to externally discovered,
//! locator-addressed resources. Availability follows a plain counting rule:
//! the dependency is available while at least one matching resource is
//! tracked.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use url::Url;

use tether_registry::{
	Filter, RESOURCE_HOST, RESOURCE_PATH, RESOURCE_PORT, RESOURCE_PROTOCOL, RegistrationId,
	ResourceDiscovery, ResourceListener, ResourceProps, ResourceSelection,
};

use crate::consumer::{ConsumerKey, Dependency, DependencyConsumer};
use crate::error::{ConfigError, PropsError};
use crate::invoke::{CallbackCall, CallbackTarget, Callbacks, CandidateRef, InstanceRef};
use crate::state::{BaseState, DependencyState};

/// Computes propagated component properties from the bound resource,
/// replacing the default locator projection.
pub trait ResourcePropsTransform: Send + Sync {
	fn properties(
		&self,
		locator: &Url,
	) -> Result<ResourceProps, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Clone)]
struct TrackedResource {
	locator: Url,
	props: Option<ResourceProps>,
}

#[derive(Clone)]
struct Core {
	base: BaseState,
	consumers: Vec<Arc<dyn DependencyConsumer>>,
	registration: Option<RegistrationId>,
	tracked: Vec<TrackedResource>,
	/// Resource remembered when the activation engine binds the dependency,
	/// replayed when it unbinds.
	bound: Option<TrackedResource>,
	pinned: Option<Url>,
	filter: Option<Filter>,
	callbacks: Callbacks,
	auto_config: bool,
	auto_config_field: Option<Box<str>>,
	propagate: bool,
	propagate_transform: Option<Arc<dyn ResourcePropsTransform>>,
}

impl Core {
	/// Pinned trackers ignore every other locator.
	fn accepts(&self, locator: &Url) -> bool {
		match &self.pinned {
			Some(pinned) => pinned == locator,
			None => true,
		}
	}

	fn label(&self) -> String {
		match (&self.pinned, &self.filter) {
			(Some(pinned), _) => pinned.to_string(),
			(None, Some(filter)) => filter.to_string(),
			(None, None) => "any resource".to_string(),
		}
	}
}

/// Dependency on zero or more discovered resources.
pub struct ResourceDependency {
	discovery: Arc<dyn ResourceDiscovery>,
	core: Mutex<Core>,
}

impl ResourceDependency {
	pub fn new(discovery: Arc<dyn ResourceDiscovery>) -> Arc<Self> {
		Arc::new(Self {
			discovery,
			core: Mutex::new(Core {
				base: BaseState::new(),
				consumers: Vec::new(),
				registration: None,
				tracked: Vec::new(),
				bound: None,
				pinned: None,
				filter: None,
				callbacks: Callbacks::new(),
				auto_config: true,
				auto_config_field: None,
				propagate: false,
				propagate_transform: None,
			}),
		})
	}

	/// An unstarted copy carrying this dependency's declaration but none of
	/// its runtime state.
	pub fn create_copy(&self) -> Arc<Self> {
		let core = self.core.lock();
		Arc::new(Self {
			discovery: Arc::clone(&self.discovery),
			core: Mutex::new(Core {
				base: core.base.template(),
				consumers: Vec::new(),
				registration: None,
				tracked: Vec::new(),
				bound: None,
				pinned: core.pinned.clone(),
				filter: core.filter.clone(),
				callbacks: core.callbacks.clone(),
				auto_config: core.auto_config,
				auto_config_field: core.auto_config_field.clone(),
				propagate: core.propagate,
				propagate_transform: core.propagate_transform.clone(),
			}),
		})
	}

	// ----- configuration (pre-start only) -----

	fn configure<R>(&self, apply: impl FnOnce(&mut Core) -> R) -> Result<R, ConfigError> {
		let mut core = self.core.lock();
		if core.base.started || core.registration.is_some() {
			return Err(ConfigError::AlreadyActive);
		}
		Ok(apply(&mut core))
	}

	/// Pins the tracker to exactly one resource. Takes precedence over a
	/// configured filter.
	pub fn set_resource(&self, locator: Url) -> Result<(), ConfigError> {
		self.configure(|core| core.pinned = Some(locator))
	}

	/// Tracks resources whose properties satisfy the filter.
	pub fn set_filter(&self, filter: &str) -> Result<(), ConfigError> {
		let filter = Filter::parse(filter)?;
		self.configure(|core| core.filter = Some(filter))
	}

	pub fn set_required(&self, required: bool) -> Result<(), ConfigError> {
		self.configure(|core| core.base.required = required)
	}

	/// Marks the dependency as added to a concrete component instance rather
	/// than its definition. May be flipped by the activation engine while
	/// tracking runs.
	pub fn set_instance_bound(&self, instance_bound: bool) {
		self.core.lock().base.instance_bound = instance_bound;
	}

	pub fn set_auto_config(&self, auto_config: bool) -> Result<(), ConfigError> {
		self.configure(|core| core.auto_config = auto_config)
	}

	/// Enables auto-configuration into the named component field.
	pub fn set_auto_config_field(&self, field: &str) -> Result<(), ConfigError> {
		self.configure(|core| {
			core.auto_config = true;
			core.auto_config_field = Some(field.into());
		})
	}

	/// Declares the user callbacks, turning auto-configuration off.
	pub fn set_callbacks(&self, callbacks: Callbacks) -> Result<(), ConfigError> {
		self.configure(|core| {
			if callbacks.any_declared() {
				core.auto_config = false;
			}
			core.callbacks = callbacks;
		})
	}

	pub fn set_propagate(&self, propagate: bool) -> Result<(), ConfigError> {
		self.configure(|core| core.propagate = propagate)
	}

	/// Propagates properties computed by the transform instead of the bound
	/// locator's projection. Implies `set_propagate(true)`.
	pub fn set_propagate_transform(
		&self,
		transform: Arc<dyn ResourcePropsTransform>,
	) -> Result<(), ConfigError> {
		self.configure(|core| {
			core.propagate = true;
			core.propagate_transform = Some(transform);
		})
	}

	// ----- lifecycle -----

	/// Registers a consumer. The first consumer opens the discovery
	/// registration; repeated starts of the same consumer are no-ops.
	pub fn start(self: &Arc<Self>, consumer: Arc<dyn DependencyConsumer>) {
		let open = {
			let mut core = self.core.lock();
			let key = ConsumerKey::of(&consumer);
			if !core.consumers.iter().any(|c| ConsumerKey::of(c) == key) {
				core.consumers.push(consumer);
			}
			if core.base.started {
				None
			} else {
				core.base.started = true;
				let selection = if let Some(locator) = &core.pinned {
					ResourceSelection::Locator(locator.clone())
				} else if let Some(filter) = &core.filter {
					ResourceSelection::Filter(filter.clone())
				} else {
					ResourceSelection::All
				};
				Some((selection, core.label()))
			}
		};
		if let Some((selection, label)) = open {
			debug!(dependency = %label, "opening resource registration");
			let id = self
				.discovery
				.register(selection, Arc::clone(self) as Arc<dyn ResourceListener>);
			let stale = {
				let mut core = self.core.lock();
				if core.base.started {
					core.registration = Some(id);
					false
				} else {
					true
				}
			};
			// Lost a race with stop(); the registration was never published.
			if stale {
				self.discovery.unregister(id);
			}
		}
	}

	/// Deregisters a consumer. The last consumer closes the registration and
	/// resets runtime bookkeeping.
	pub fn stop(&self, consumer: &Arc<dyn DependencyConsumer>) {
		let key = ConsumerKey::of(consumer);
		let close = {
			let mut core = self.core.lock();
			let before = core.consumers.len();
			core.consumers.retain(|c| ConsumerKey::of(c) != key);
			if core.consumers.len() == before {
				None
			} else if core.consumers.is_empty() && core.base.started {
				core.base.started = false;
				core.tracked.clear();
				core.bound = None;
				core.registration.take().map(|id| (id, core.label()))
			} else {
				None
			}
		};
		if let Some((id, label)) = close {
			self.discovery.unregister(id);
			debug!(dependency = %label, "closed resource registration");
		}
	}

	// ----- resource access -----

	/// The most recently bound resource, if any.
	pub fn resource(&self) -> Option<Url> {
		let core = self.core.lock();
		core.bound
			.as_ref()
			.or_else(|| core.tracked.last())
			.map(|resource| resource.locator.clone())
	}

	// ----- activation engine entry points -----

	/// Remembers and binds the current resource. Called by the activation
	/// engine once a required dependency's component is configured.
	pub fn invoke_added(&self, consumer: &Arc<dyn DependencyConsumer>) {
		let core = {
			let mut core = self.core.lock();
			core.bound = core.tracked.last().cloned();
			core.clone()
		};
		let Some(resource) = core.bound.clone() else {
			return;
		};
		self.dispatch(
			&core,
			consumer,
			core.callbacks.added_name(),
			&resource.locator,
			resource.props.as_ref(),
		);
	}

	/// Replays the remembered resource as removed. Called by the activation
	/// engine when the component is unconfigured.
	pub fn invoke_removed(&self, consumer: &Arc<dyn DependencyConsumer>) {
		let (core, resource) = {
			let mut core = self.core.lock();
			let resource = core.bound.take();
			(core.clone(), resource)
		};
		let Some(resource) = resource else {
			return;
		};
		self.dispatch(
			&core,
			consumer,
			core.callbacks.removed_name(),
			&resource.locator,
			resource.props.as_ref(),
		);
	}

	// ----- notification processing -----

	fn resource_added(&self, locator: &Url, props: Option<&ResourceProps>) {
		let (core, count) = {
			let mut core = self.core.lock();
			if !core.accepts(locator) {
				return;
			}
			core.tracked.push(TrackedResource {
				locator: locator.clone(),
				props: props.cloned(),
			});
			let count = core.tracked.len();
			(core.clone(), count)
		};
		debug!(dependency = %core.label(), resource = %locator, count, "resource added");
		for consumer in &core.consumers {
			if count == 1 {
				consumer.dependency_available(self);
				if !core.base.required {
					self.dispatch(&core, consumer, core.callbacks.added_name(), locator, props);
				}
			} else {
				consumer.dependency_changed(self);
				self.dispatch(&core, consumer, core.callbacks.added_name(), locator, props);
			}
		}
	}

	fn resource_changed(&self, locator: &Url, props: Option<&ResourceProps>) {
		let core = {
			let mut core = self.core.lock();
			if !core.accepts(locator) {
				return;
			}
			match core
				.tracked
				.iter_mut()
				.find(|resource| &resource.locator == locator)
			{
				Some(resource) => resource.props = props.cloned(),
				None => {
					warn!(resource = %locator, "change notification for untracked resource");
					return;
				}
			}
			core.clone()
		};
		for consumer in &core.consumers {
			self.dispatch(&core, consumer, core.callbacks.changed_name(), locator, props);
		}
	}

	fn resource_removed(&self, locator: &Url, props: Option<&ResourceProps>) {
		let (core, count) = {
			let mut core = self.core.lock();
			if !core.accepts(locator) {
				return;
			}
			let Some(position) = core
				.tracked
				.iter()
				.position(|resource| &resource.locator == locator)
			else {
				warn!(resource = %locator, "removal notification for unknown resource");
				return;
			};
			core.tracked.remove(position);
			let count = core.tracked.len();
			(core.clone(), count)
		};
		debug!(dependency = %core.label(), resource = %locator, count, "resource removed");
		for consumer in &core.consumers {
			if count == 0 {
				consumer.dependency_unavailable(self);
				if !core.base.required {
					self.dispatch(&core, consumer, core.callbacks.removed_name(), locator, props);
				}
			} else {
				consumer.dependency_changed(self);
				self.dispatch(&core, consumer, core.callbacks.removed_name(), locator, props);
			}
		}
	}

	// ----- callback dispatch -----

	fn callback_targets(
		&self,
		core: &Core,
		consumer: &Arc<dyn DependencyConsumer>,
	) -> Vec<Arc<dyn CallbackTarget>> {
		match core.callbacks.target() {
			Some(target) => vec![target],
			None => consumer.composition_targets(),
		}
	}

	fn dispatch(
		&self,
		core: &Core,
		consumer: &Arc<dyn DependencyConsumer>,
		name: Option<&str>,
		locator: &Url,
		props: Option<&ResourceProps>,
	) {
		let Some(name) = name else {
			return;
		};
		let targets = self.callback_targets(core, consumer);
		let component = consumer.component();
		let candidate = CandidateRef::Resource { locator };
		let calls = [
			CallbackCall::ContextCandidateProps {
				component: component.as_ref(),
				candidate,
				props,
			},
			CallbackCall::ContextCandidate {
				component: component.as_ref(),
				candidate,
			},
			CallbackCall::Context {
				component: component.as_ref(),
			},
			CallbackCall::CandidateProps { candidate, props },
			CallbackCall::Candidate { candidate },
			CallbackCall::Instance {
				instance: InstanceRef::Resource(locator),
			},
			CallbackCall::NoArgs,
		];
		consumer.invoke_callback_method(&targets, name, &calls);
	}
}

impl ResourceListener for ResourceDependency {
	fn added(&self, locator: &Url, props: Option<&ResourceProps>) {
		self.resource_added(locator, props);
	}

	fn changed(&self, locator: &Url, props: Option<&ResourceProps>) {
		self.resource_changed(locator, props);
	}

	fn removed(&self, locator: &Url, props: Option<&ResourceProps>) {
		self.resource_removed(locator, props);
	}
}

impl Dependency for ResourceDependency {
	fn state(&self) -> DependencyState {
		let core = self.core.lock();
		core.base.state(!core.tracked.is_empty())
	}

	fn is_required(&self) -> bool {
		self.core.lock().base.required
	}

	fn is_instance_bound(&self) -> bool {
		self.core.lock().base.instance_bound
	}

	fn is_available(&self) -> bool {
		!self.core.lock().tracked.is_empty()
	}

	fn is_auto_config(&self) -> bool {
		self.core.lock().auto_config
	}

	fn auto_config_field(&self) -> Option<String> {
		self.core.lock().auto_config_field.as_deref().map(str::to_string)
	}

	fn is_propagated(&self) -> bool {
		self.core.lock().propagate
	}

	/// Derives host/path/protocol/port from the most recently bound
	/// resource, merging custom properties that do not collide with the four
	/// reserved keys, or delegates to the configured transform.
	fn properties(&self) -> Result<ResourceProps, PropsError> {
		let core = self.core.lock().clone();
		let Some(resource) = core.bound.clone().or_else(|| core.tracked.last().cloned())
		else {
			return Err(PropsError::NothingBound);
		};
		if let Some(transform) = &core.propagate_transform {
			return transform.properties(&resource.locator).map_err(|cause| {
				warn!(dependency = %core.label(), %cause, "propagation transform failed");
				PropsError::Transform(cause)
			});
		}
		let locator = &resource.locator;
		let mut props = ResourceProps::new();
		props.insert(
			RESOURCE_HOST.to_string(),
			locator.host_str().unwrap_or_default().to_string(),
		);
		props.insert(RESOURCE_PATH.to_string(), locator.path().to_string());
		props.insert(RESOURCE_PROTOCOL.to_string(), locator.scheme().to_string());
		props.insert(
			RESOURCE_PORT.to_string(),
			locator
				.port()
				.map(|port| port.to_string())
				.unwrap_or_else(|| "-1".to_string()),
		);
		if let Some(custom) = &resource.props {
			for (key, value) in custom {
				let reserved = [
					RESOURCE_HOST,
					RESOURCE_PATH,
					RESOURCE_PROTOCOL,
					RESOURCE_PORT,
				];
				if reserved.contains(&key.as_str()) {
					warn!(key = %key, "custom resource property collides with derived key");
				} else {
					props.insert(key.clone(), value.clone());
				}
			}
		}
		Ok(props)
	}

	fn name(&self) -> String {
		self.core.lock().label()
	}

	fn kind(&self) -> &'static str {
		"resource"
	}
}
