//! Capability-backed dependency tracking.
//!
//! Tracks typed capability instances published by the registry, keeps the
//! availability edge synchronized with live publications, and resolves
//! decoration chains by rank when a swap callback is declared: among several
//! decorators of the same origin, only the highest-ranked one is ever
//! considered bound, and rank changes surface as atomic swap notifications.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use tether_registry::{
	CapabilityHandle, CapabilityId, CapabilityListener, CapabilityRegistry, CapabilityType,
	Filter, Instance, KEY_CAPABILITY_ID, KEY_ORIGIN_ID, OriginId, ResourceProps, Selector,
	SubscribeOptions, SubscriptionId, TrackingFault,
};

use crate::consumer::{ConsumerKey, Dependency, DependencyConsumer};
use crate::error::{ConfigError, PropsError};
use crate::invoke::{CallbackCall, CallbackTarget, Callbacks, CandidateRef, InstanceRef};
use crate::state::{BaseState, DependencyState};

/// Computes propagated component properties from the bound capability,
/// replacing the default handle-metadata projection.
pub trait CapabilityPropsTransform: Send + Sync {
	fn properties(
		&self,
		handle: &CapabilityHandle,
		instance: &Instance,
	) -> Result<ResourceProps, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fallback used by service lookup when nothing is bound and
/// auto-configuration is on.
#[derive(Clone)]
pub enum DefaultImplementation {
	Instance(Instance),
	Factory(Arc<dyn Fn() -> Instance + Send + Sync>),
}

impl DefaultImplementation {
	fn instantiate(&self) -> Instance {
		match self {
			Self::Instance(instance) => Arc::clone(instance),
			Self::Factory(factory) => factory(),
		}
	}
}

/// What this dependency tracks. Declared through one of the selection
/// setters; each declaration replaces the previous one entirely.
#[derive(Clone)]
enum Selection {
	None,
	Type(CapabilityType),
	Filter {
		capability: Option<CapabilityType>,
		filter: Filter,
	},
	Pinned {
		capability: CapabilityType,
		handle: CapabilityHandle,
	},
}

impl Selection {
	fn selector(&self) -> Option<Selector> {
		match self {
			Self::None => None,
			Self::Type(capability) => Some(Selector::Type(*capability)),
			Self::Filter { capability, filter } => Some(Selector::Filter {
				capability: *capability,
				filter: filter.clone(),
			}),
			Self::Pinned { handle, .. } => Some(Selector::Pinned(handle.clone())),
		}
	}

	fn capability(&self) -> Option<&CapabilityType> {
		match self {
			Self::None => None,
			Self::Type(capability) => Some(capability),
			Self::Filter { capability, .. } => capability.as_ref(),
			Self::Pinned { capability, .. } => Some(capability),
		}
	}

	/// Candidate admission: the instance must satisfy the declared type.
	/// A bare filter declares no type and admits every instance.
	fn admits(&self, instance: &Instance) -> bool {
		match self.capability() {
			Some(capability) => capability.satisfied_by(instance),
			None => true,
		}
	}

	fn describe(&self) -> String {
		match self {
			Self::None => "unconfigured".to_string(),
			Self::Type(capability) => capability.name().to_string(),
			Self::Filter {
				capability: Some(capability),
				filter,
			} => format!("{capability} {filter}"),
			Self::Filter {
				capability: None,
				filter,
			} => filter.to_string(),
			Self::Pinned { capability, handle } => format!("{capability} {handle}"),
		}
	}
}

/// A tracked (handle, instance) pair.
#[derive(Clone)]
struct Candidate {
	handle: CapabilityHandle,
	instance: Instance,
}

impl Candidate {
	fn of(handle: &CapabilityHandle, instance: &Instance) -> Self {
		Self {
			handle: handle.clone(),
			instance: Arc::clone(instance),
		}
	}
}

/// Consumer set, configuration, and lifecycle flags. Bookkeeping only; the
/// lock around it is never held across a consumer callback.
#[derive(Clone)]
struct Core {
	base: BaseState,
	consumers: Vec<Arc<dyn DependencyConsumer>>,
	subscription: Option<SubscriptionId>,
	selection: Selection,
	callbacks: Callbacks,
	auto_config: bool,
	auto_config_field: Option<Box<str>>,
	auto_config_invoked: bool,
	default_impl: Option<DefaultImplementation>,
	propagate: bool,
	propagate_transform: Option<Arc<dyn CapabilityPropsTransform>>,
	trace_label: Option<Box<str>>,
}

impl Core {
	fn label(&self) -> String {
		self.trace_label
			.as_deref()
			.map(str::to_string)
			.unwrap_or_else(|| self.selection.describe())
	}
}

/// Outcome of a chain bookkeeping update, resolved under the rank lock and
/// acted on after it is released.
enum ChainEvent {
	/// First member of the chain for this origin.
	First,
	/// The active candidate changed.
	Swap {
		previous: Candidate,
		current: Candidate,
	},
	/// A non-active member joined or left; nothing to deliver.
	Shadowed,
	/// Last member left; the chain is gone.
	Ended,
}

/// Dependency on zero or more typed capability instances.
///
/// Three independent critical sections guard the bookkeeping: the core lock
/// (consumers, configuration, lifecycle), the bound-set lock (exactly-once
/// admission per consumer), and the rank lock (decoration chains). None of
/// them is held while a consumer or user callback runs.
pub struct CapabilityDependency {
	registry: Arc<dyn CapabilityRegistry>,
	core: Mutex<Core>,
	bound: Mutex<FxHashMap<ConsumerKey, FxHashMap<CapabilityId, Candidate>>>,
	ranked: Mutex<FxHashMap<ConsumerKey, FxHashMap<OriginId, BTreeMap<i32, Candidate>>>>,
	available: AtomicBool,
}

impl CapabilityDependency {
	pub fn new(registry: Arc<dyn CapabilityRegistry>) -> Arc<Self> {
		Arc::new(Self {
			registry,
			core: Mutex::new(Core {
				base: BaseState::new(),
				consumers: Vec::new(),
				subscription: None,
				selection: Selection::None,
				callbacks: Callbacks::new(),
				auto_config: true,
				auto_config_field: None,
				auto_config_invoked: false,
				default_impl: None,
				propagate: false,
				propagate_transform: None,
				trace_label: None,
			}),
			bound: Mutex::new(FxHashMap::default()),
			ranked: Mutex::new(FxHashMap::default()),
			available: AtomicBool::new(false),
		})
	}

	/// An unstarted copy carrying this dependency's declaration but none of
	/// its runtime state, for a new component instance.
	pub fn create_copy(&self) -> Arc<Self> {
		let core = self.core.lock();
		Arc::new(Self {
			registry: Arc::clone(&self.registry),
			core: Mutex::new(Core {
				base: core.base.template(),
				consumers: Vec::new(),
				subscription: None,
				selection: core.selection.clone(),
				callbacks: core.callbacks.clone(),
				auto_config: core.auto_config,
				auto_config_field: core.auto_config_field.clone(),
				auto_config_invoked: core.auto_config_invoked,
				default_impl: core.default_impl.clone(),
				propagate: core.propagate,
				propagate_transform: core.propagate_transform.clone(),
				trace_label: core.trace_label.clone(),
			}),
			bound: Mutex::new(FxHashMap::default()),
			ranked: Mutex::new(FxHashMap::default()),
			available: AtomicBool::new(false),
		})
	}

	// ----- configuration (pre-start only) -----

	fn configure<R>(&self, apply: impl FnOnce(&mut Core) -> R) -> Result<R, ConfigError> {
		let mut core = self.core.lock();
		if core.base.started || core.subscription.is_some() {
			return Err(ConfigError::AlreadyActive);
		}
		Ok(apply(&mut core))
	}

	/// Tracks every publication of the declared type.
	pub fn set_capability(&self, capability: CapabilityType) -> Result<(), ConfigError> {
		self.configure(|core| core.selection = Selection::Type(capability))
	}

	/// Tracks publications satisfying the filter, optionally narrowed to a
	/// declared type. Without a type, every matching instance is admitted.
	pub fn set_filter(
		&self,
		capability: Option<CapabilityType>,
		filter: &str,
	) -> Result<(), ConfigError> {
		let filter = Filter::parse(filter)?;
		self.configure(|core| {
			core.selection = Selection::Filter { capability, filter };
		})
	}

	/// Tracks exactly one pinned publication.
	pub fn set_pinned(
		&self,
		capability: CapabilityType,
		handle: CapabilityHandle,
	) -> Result<(), ConfigError> {
		self.configure(|core| {
			core.selection = Selection::Pinned { capability, handle };
		})
	}

	pub fn set_required(&self, required: bool) -> Result<(), ConfigError> {
		self.configure(|core| core.base.required = required)
	}

	/// Marks the dependency as added to a concrete component instance rather
	/// than its definition. Unlike the other setters this may be flipped by
	/// the activation engine while tracking runs.
	pub fn set_instance_bound(&self, instance_bound: bool) {
		self.core.lock().base.instance_bound = instance_bound;
	}

	pub fn set_auto_config(&self, auto_config: bool) -> Result<(), ConfigError> {
		self.configure(|core| {
			core.auto_config = auto_config;
			core.auto_config_invoked = true;
		})
	}

	/// Enables auto-configuration into the named component field.
	pub fn set_auto_config_field(&self, field: &str) -> Result<(), ConfigError> {
		self.configure(|core| {
			core.auto_config = true;
			core.auto_config_field = Some(field.into());
			core.auto_config_invoked = true;
		})
	}

	/// Declares the user callbacks. Declaring any callback turns
	/// auto-configuration off unless it was set explicitly.
	pub fn set_callbacks(&self, callbacks: Callbacks) -> Result<(), ConfigError> {
		self.configure(|core| {
			if callbacks.any_declared() && !core.auto_config_invoked {
				core.auto_config = false;
			}
			core.callbacks = callbacks;
		})
	}

	pub fn set_default_implementation(
		&self,
		default_impl: DefaultImplementation,
	) -> Result<(), ConfigError> {
		self.configure(|core| core.default_impl = Some(default_impl))
	}

	pub fn set_propagate(&self, propagate: bool) -> Result<(), ConfigError> {
		self.configure(|core| core.propagate = propagate)
	}

	/// Propagates properties computed by the transform instead of the bound
	/// handle's metadata. Implies `set_propagate(true)`.
	pub fn set_propagate_transform(
		&self,
		transform: Arc<dyn CapabilityPropsTransform>,
	) -> Result<(), ConfigError> {
		self.configure(|core| {
			core.propagate = true;
			core.propagate_transform = Some(transform);
		})
	}

	/// Label used in tracing events instead of the derived selection
	/// description.
	pub fn set_trace_label(&self, label: &str) -> Result<(), ConfigError> {
		self.configure(|core| core.trace_label = Some(label.into()))
	}

	// ----- lifecycle -----

	/// Registers a consumer. The first consumer opens the registry
	/// subscription; repeated starts of the same consumer are no-ops.
	pub fn start(
		self: &Arc<Self>,
		consumer: Arc<dyn DependencyConsumer>,
	) -> Result<(), ConfigError> {
		let open = {
			let mut core = self.core.lock();
			let key = ConsumerKey::of(&consumer);
			if !core.consumers.iter().any(|c| ConsumerKey::of(c) == key) {
				core.consumers.push(consumer);
			}
			if core.base.started {
				None
			} else {
				let Some(selector) = core.selection.selector() else {
					return Err(ConfigError::NothingSelected);
				};
				core.base.started = true;
				let options = SubscribeOptions {
					include_decorators: core.callbacks.has_swapped(),
				};
				Some((selector, options, core.label()))
			}
		};
		if let Some((selector, options, label)) = open {
			debug!(dependency = %label, selector = %selector, "opening capability subscription");
			let id = self.registry.subscribe(
				selector,
				options,
				Arc::clone(self) as Arc<dyn CapabilityListener>,
			);
			let stale = {
				let mut core = self.core.lock();
				if core.base.started {
					core.subscription = Some(id);
					false
				} else {
					true
				}
			};
			// Lost a race with stop(); the subscription was never published.
			if stale {
				self.registry.unsubscribe(id);
			}
		}
		Ok(())
	}

	/// Deregisters a consumer. The last consumer closes the subscription and
	/// resets runtime bookkeeping; the dependency can be reconfigured and
	/// started again afterwards.
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
				core.subscription.take().map(|id| (id, core.label()))
			} else {
				None
			}
		};
		self.bound.lock().remove(&key);
		self.ranked.lock().remove(&key);
		if let Some((id, label)) = close {
			self.registry.unsubscribe(id);
			self.available.store(false, Ordering::Release);
			self.bound.lock().clear();
			self.ranked.lock().clear();
			debug!(dependency = %label, "closed capability subscription");
		}
	}

	// ----- service access -----

	/// The tracked instance, falling back to the default implementation and
	/// then the declared type's placeholder when auto-configuration is on.
	pub fn service(&self) -> Option<Instance> {
		let core = self.snapshot();
		let tracked = if core.base.started {
			core.selection
				.selector()
				.and_then(|selector| self.registry.lookup(&selector))
				.map(|(_, instance)| instance)
		} else {
			None
		};
		tracked.or_else(|| self.fallback(&core))
	}

	/// As [`service`](Self::service), but queries the registry directly when
	/// tracking has not started. Requires a declared selection.
	pub fn lookup_service(&self) -> Result<Option<Instance>, TrackingFault> {
		let core = self.snapshot();
		let Some(selector) = core.selection.selector() else {
			return Err(TrackingFault::NothingDeclared);
		};
		let tracked = self
			.registry
			.lookup(&selector)
			.map(|(_, instance)| instance);
		Ok(tracked.or_else(|| self.fallback(&core)))
	}

	fn fallback(&self, core: &Core) -> Option<Instance> {
		if !core.auto_config {
			return None;
		}
		if let Some(default_impl) = &core.default_impl {
			return Some(default_impl.instantiate());
		}
		core.selection.capability().and_then(CapabilityType::placeholder)
	}

	// ----- activation engine entry points -----

	/// Binds every currently matching candidate to the consumer. Called by
	/// the activation engine once a required dependency's component is
	/// configured.
	pub fn invoke_added(
		&self,
		consumer: &Arc<dyn DependencyConsumer>,
	) -> Result<(), TrackingFault> {
		let core = self.snapshot();
		let Some(selector) = core.selection.selector() else {
			return Err(TrackingFault::NothingDeclared);
		};
		debug!(dependency = %core.label(), "binding current candidates");
		for handle in self.registry.matches(&selector) {
			if let Some(instance) = self.registry.acquire(&handle) {
				if core.selection.admits(&instance) {
					self.invoke_added_for(&core, consumer, &handle, &instance)?;
				} else {
					self.registry.release(&handle);
				}
			}
		}
		Ok(())
	}

	/// Unbinds everything bound to the consumer. Called by the activation
	/// engine when the component is unconfigured.
	pub fn invoke_removed(&self, consumer: &Arc<dyn DependencyConsumer>) {
		let core = self.snapshot();
		let candidates: Vec<Candidate> = {
			let bound = self.bound.lock();
			bound
				.get(&ConsumerKey::of(consumer))
				.map(|set| set.values().cloned().collect())
				.unwrap_or_default()
		};
		for candidate in candidates {
			self.invoke_removed_for(&core, consumer, &candidate.handle, &candidate.instance);
		}
	}

	// ----- notification processing -----

	fn snapshot(&self) -> Core {
		self.core.lock().clone()
	}

	fn candidate_added(
		&self,
		handle: CapabilityHandle,
		instance: Instance,
	) -> Result<(), TrackingFault> {
		let core = self.snapshot();
		if !core.selection.admits(&instance) {
			debug!(dependency = %core.label(), handle = %handle, "rejecting candidate of undeclared type");
			self.registry.release(&handle);
			return Ok(());
		}
		let became_available = !self.available.swap(true, Ordering::AcqRel);
		debug!(
			dependency = %core.label(),
			handle = %handle,
			rank = handle.rank(),
			became_available,
			"candidate added"
		);
		for consumer in &core.consumers {
			if became_available {
				if consumer.is_instantiated() && core.base.instance_bound && core.base.required {
					self.invoke_added_for(&core, consumer, &handle, &instance)?;
				}
				consumer.dependency_available(self);
				if !core.base.required {
					// Optional dependencies bind immediately; required ones
					// are bound by the activation engine once every
					// requirement holds.
					self.invoke_added_for(&core, consumer, &handle, &instance)?;
				}
			} else {
				consumer.dependency_changed(self);
				if consumer.is_instantiated() && !consumer.composition_targets().is_empty() {
					self.invoke_added_for(&core, consumer, &handle, &instance)?;
				}
			}
		}
		Ok(())
	}

	fn candidate_modified(
		&self,
		handle: CapabilityHandle,
		instance: Instance,
	) -> Result<(), TrackingFault> {
		let core = self.snapshot();
		if !core.selection.admits(&instance) {
			return Ok(());
		}
		for consumer in &core.consumers {
			consumer.dependency_changed(self);
			if consumer.is_registered() {
				self.dispatch(&core, consumer, core.callbacks.changed_name(), &handle, &instance);
			}
		}
		Ok(())
	}

	fn candidate_removed(
		&self,
		handle: CapabilityHandle,
		instance: Instance,
	) -> Result<(), TrackingFault> {
		let core = self.snapshot();
		if !core.selection.admits(&instance) {
			// Rejected at admission; the acquisition was given back then.
			return Ok(());
		}
		let became_unavailable = self.make_unavailable(&core);
		debug!(
			dependency = %core.label(),
			handle = %handle,
			rank = handle.rank(),
			became_unavailable,
			"candidate removed"
		);
		for consumer in &core.consumers {
			if became_unavailable {
				consumer.dependency_unavailable(self);
				// Optional dependencies unbind here; required ones were
				// unbound when the component was unconfigured, except
				// instance-bound ones on a live component.
				if !core.base.required
					|| (consumer.is_instantiated() && core.base.instance_bound)
				{
					self.invoke_removed_for(&core, consumer, &handle, &instance);
				}
			} else {
				consumer.dependency_changed(self);
				self.invoke_removed_for(&core, consumer, &handle, &instance);
			}
		}
		self.registry.release(&handle);
		Ok(())
	}

	/// Flips available off only while the registry confirms no candidate
	/// remains; bookkeeping counts and registry state can diverge
	/// transiently.
	fn make_unavailable(&self, core: &Core) -> bool {
		if !self.available.load(Ordering::Acquire) {
			return false;
		}
		if core.base.started {
			if let Some(selector) = core.selection.selector() {
				if self.registry.has_match(&selector) {
					return false;
				}
			}
		}
		self.available
			.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	// ----- exactly-once binding -----

	fn invoke_added_for(
		&self,
		core: &Core,
		consumer: &Arc<dyn DependencyConsumer>,
		handle: &CapabilityHandle,
		instance: &Instance,
	) -> Result<(), TrackingFault> {
		let key = ConsumerKey::of(consumer);
		let newly_bound = {
			let mut bound = self.bound.lock();
			bound
				.entry(key)
				.or_default()
				.insert(handle.id(), Candidate::of(handle, instance))
				.is_none()
		};
		if !newly_bound {
			return Ok(());
		}
		let result = if core.callbacks.has_swapped() {
			self.chain_added(core, consumer, handle, instance)
		} else {
			self.dispatch(core, consumer, core.callbacks.added_name(), handle, instance);
			Ok(())
		};
		if result.is_err() {
			// Undo the admission so the fault leaves no state behind.
			let mut bound = self.bound.lock();
			if let Some(set) = bound.get_mut(&key) {
				set.remove(&handle.id());
				if set.is_empty() {
					bound.remove(&key);
				}
			}
		}
		result
	}

	fn invoke_removed_for(
		&self,
		core: &Core,
		consumer: &Arc<dyn DependencyConsumer>,
		handle: &CapabilityHandle,
		instance: &Instance,
	) {
		let key = ConsumerKey::of(consumer);
		let was_bound = {
			let mut bound = self.bound.lock();
			let Some(set) = bound.get_mut(&key) else {
				return;
			};
			let removed = set.remove(&handle.id()).is_some();
			if set.is_empty() {
				bound.remove(&key);
			}
			removed
		};
		if !was_bound {
			return;
		}
		if core.callbacks.has_swapped() {
			self.chain_removed(core, consumer, handle, instance);
		} else {
			self.dispatch(core, consumer, core.callbacks.removed_name(), handle, instance);
		}
	}

	// ----- decoration chains -----

	fn chain_added(
		&self,
		core: &Core,
		consumer: &Arc<dyn DependencyConsumer>,
		handle: &CapabilityHandle,
		instance: &Instance,
	) -> Result<(), TrackingFault> {
		if handle.is_chain_internal() {
			debug!(dependency = %core.label(), handle = %handle, "skipping chain-internal candidate");
			return Ok(());
		}
		let key = ConsumerKey::of(consumer);
		let event = {
			let mut ranked = self.ranked.lock();
			let chain = ranked
				.entry(key)
				.or_default()
				.entry(handle.origin())
				.or_default();
			if chain.is_empty() {
				chain.insert(handle.rank(), Candidate::of(handle, instance));
				ChainEvent::First
			} else {
				let (&top_rank, top) = chain.last_key_value().expect("chain is non-empty");
				let previous = top.clone();
				if handle.rank() == top_rank && handle.id() != previous.handle.id() {
					return Err(TrackingFault::EqualRankSwap {
						origin: handle.origin(),
						rank: top_rank,
					});
				}
				chain.insert(handle.rank(), Candidate::of(handle, instance));
				let (_, current) = chain.last_key_value().expect("chain is non-empty");
				if current.handle.id() == previous.handle.id() {
					ChainEvent::Shadowed
				} else {
					ChainEvent::Swap {
						previous,
						current: current.clone(),
					}
				}
			}
		};
		match event {
			ChainEvent::First => {
				self.dispatch(core, consumer, core.callbacks.added_name(), handle, instance);
			}
			ChainEvent::Swap { previous, current } => {
				self.dispatch_swapped(core, consumer, &previous, &current);
			}
			ChainEvent::Shadowed => {
				debug!(
					dependency = %core.label(),
					handle = %handle,
					rank = handle.rank(),
					"candidate shadowed by active decorator"
				);
			}
			ChainEvent::Ended => unreachable!("additions never end a chain"),
		}
		Ok(())
	}

	fn chain_removed(
		&self,
		core: &Core,
		consumer: &Arc<dyn DependencyConsumer>,
		handle: &CapabilityHandle,
		instance: &Instance,
	) {
		if handle.is_chain_internal() {
			return;
		}
		let key = ConsumerKey::of(consumer);
		let event = {
			let mut ranked = self.ranked.lock();
			let Some(chains) = ranked.get_mut(&key) else {
				return;
			};
			let Some(chain) = chains.get_mut(&handle.origin()) else {
				return;
			};
			let is_last = chain.len() == 1
				&& chain
					.values()
					.next()
					.is_some_and(|candidate| candidate.handle.id() == handle.id());
			let previous_active = if is_last {
				None
			} else {
				chain.last_key_value().map(|(_, candidate)| candidate.clone())
			};
			chain.retain(|_, candidate| candidate.handle.id() != handle.id());
			let mut event = if is_last {
				ChainEvent::Ended
			} else {
				ChainEvent::Shadowed
			};
			if let Some(previous) = previous_active {
				// The active decorator left while the chain survives. A
				// removal arriving right after its undecorated origin was
				// re-added is an expected ordering artifact of chains
				// re-publishing themselves.
				if previous.handle.id() == handle.id() {
					if let Some((_, current)) = chain.last_key_value() {
						event = ChainEvent::Swap {
							previous,
							current: current.clone(),
						};
					}
				}
			}
			let chain_empty = chain.is_empty();
			if chain_empty {
				chains.remove(&handle.origin());
			}
			if chains.is_empty() {
				ranked.remove(&key);
			}
			event
		};
		match event {
			ChainEvent::Ended => {
				self.dispatch(core, consumer, core.callbacks.removed_name(), handle, instance);
			}
			ChainEvent::Swap { previous, current } => {
				self.dispatch_swapped(core, consumer, &previous, &current);
			}
			ChainEvent::Shadowed => {
				debug!(dependency = %core.label(), handle = %handle, "removed shadowed decorator");
			}
			ChainEvent::First => unreachable!("removals never start a chain"),
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
		handle: &CapabilityHandle,
		instance: &Instance,
	) {
		let Some(name) = name else {
			return;
		};
		let targets = self.callback_targets(core, consumer);
		let component = consumer.component();
		let candidate = CandidateRef::Capability { handle, instance };
		let props = handle.properties();
		let calls = [
			CallbackCall::ContextCandidateProps {
				component: component.as_ref(),
				candidate,
				props: Some(props),
			},
			CallbackCall::ContextCandidate {
				component: component.as_ref(),
				candidate,
			},
			CallbackCall::Context {
				component: component.as_ref(),
			},
			CallbackCall::CandidateProps {
				candidate,
				props: Some(props),
			},
			CallbackCall::Candidate { candidate },
			CallbackCall::Instance {
				instance: InstanceRef::Capability(instance),
			},
			CallbackCall::NoArgs,
		];
		consumer.invoke_callback_method(&targets, name, &calls);
	}

	fn dispatch_swapped(
		&self,
		core: &Core,
		consumer: &Arc<dyn DependencyConsumer>,
		previous: &Candidate,
		current: &Candidate,
	) {
		let Some(name) = core.callbacks.swapped_name() else {
			return;
		};
		debug!(
			dependency = %core.label(),
			previous = %previous.handle,
			previous_rank = previous.handle.rank(),
			current = %current.handle,
			current_rank = current.handle.rank(),
			"swapping active decorator"
		);
		let targets = self.callback_targets(core, consumer);
		let component = consumer.component();
		let previous_ref = CandidateRef::Capability {
			handle: &previous.handle,
			instance: &previous.instance,
		};
		let current_ref = CandidateRef::Capability {
			handle: &current.handle,
			instance: &current.instance,
		};
		let calls = [
			CallbackCall::Swapped {
				component: None,
				previous: previous_ref,
				current: current_ref,
			},
			CallbackCall::Swapped {
				component: Some(component.as_ref()),
				previous: previous_ref,
				current: current_ref,
			},
			CallbackCall::NoArgs,
		];
		consumer.invoke_callback_method(&targets, name, &calls);
	}
}

impl CapabilityListener for CapabilityDependency {
	fn added(&self, handle: CapabilityHandle, instance: Instance) -> Result<(), TrackingFault> {
		self.candidate_added(handle, instance)
	}

	fn modified(&self, handle: CapabilityHandle, instance: Instance) -> Result<(), TrackingFault> {
		self.candidate_modified(handle, instance)
	}

	fn removed(&self, handle: CapabilityHandle, instance: Instance) -> Result<(), TrackingFault> {
		self.candidate_removed(handle, instance)
	}
}

impl Dependency for CapabilityDependency {
	fn state(&self) -> DependencyState {
		let core = self.core.lock();
		core.base.state(self.available.load(Ordering::Acquire))
	}

	fn is_required(&self) -> bool {
		self.core.lock().base.required
	}

	fn is_instance_bound(&self) -> bool {
		self.core.lock().base.instance_bound
	}

	fn is_available(&self) -> bool {
		self.available.load(Ordering::Acquire)
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

	/// Projects the bound candidate's metadata, excluding the reserved
	/// identity keys, or delegates to the configured transform.
	fn properties(&self) -> Result<ResourceProps, PropsError> {
		let core = self.snapshot();
		let Some(selector) = core.selection.selector() else {
			return Err(PropsError::NothingBound);
		};
		let Some((handle, instance)) = self.registry.lookup(&selector) else {
			return Err(PropsError::NothingBound);
		};
		if let Some(transform) = &core.propagate_transform {
			transform.properties(&handle, &instance).map_err(|cause| {
				warn!(dependency = %core.label(), %cause, "propagation transform failed");
				PropsError::Transform(cause)
			})
		} else {
			let mut props = handle.properties().clone();
			props.remove(KEY_CAPABILITY_ID);
			props.remove(KEY_ORIGIN_ID);
			Ok(props)
		}
	}

	fn name(&self) -> String {
		self.core.lock().selection.describe()
	}

	fn kind(&self) -> &'static str {
		"capability"
	}
}
