//! Mock registry, discovery, and consumer used across the tracker tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use url::Url;

use tether_registry::{
	CapabilityHandle, CapabilityId, CapabilityListener, CapabilityRegistry, HandleMeta,
	Instance, KEY_CAPABILITY_ID, KEY_ORIGIN_ID, OriginId, RegistrationId, ResourceDiscovery,
	ResourceListener, ResourceProps, ResourceSelection, Selector, SubscribeOptions,
	SubscriptionId, TrackingFault,
};

use crate::consumer::{Dependency, DependencyConsumer};
use crate::invoke::{CallbackCall, CallbackTarget, CandidateRef, InvokeOutcome};

// ----- capability registry -----

pub struct Publish {
	pub rank: i32,
	pub origin: Option<OriginId>,
	pub chain_internal: bool,
	pub props: Vec<(String, String)>,
}

impl Default for Publish {
	fn default() -> Self {
		Self {
			rank: 0,
			origin: None,
			chain_internal: false,
			props: Vec::new(),
		}
	}
}

struct Publication {
	handle: CapabilityHandle,
	instance: Instance,
}

struct Subscription {
	id: SubscriptionId,
	selector: Selector,
	options: SubscribeOptions,
	listener: Arc<dyn CapabilityListener>,
}

#[derive(Default)]
struct RegistryState {
	next_id: u64,
	next_subscription: u64,
	publications: Vec<Publication>,
	subscriptions: Vec<Subscription>,
	releases: Vec<CapabilityId>,
	subscribe_count: usize,
	unsubscribe_count: usize,
	faults: Vec<TrackingFault>,
}

#[derive(Default)]
pub struct MockRegistry {
	state: Mutex<RegistryState>,
}

impl MockRegistry {
	pub fn new() -> Arc<Self> {
		Arc::default()
	}

	pub fn publish(self: &Arc<Self>, instance: Instance, spec: Publish) -> CapabilityHandle {
		let (handle, listeners) = {
			let mut state = self.state.lock();
			state.next_id += 1;
			let id = CapabilityId(state.next_id);
			let origin = spec.origin.unwrap_or(OriginId(id.0));
			let mut properties: ResourceProps = spec.props.into_iter().collect();
			properties.insert(KEY_CAPABILITY_ID.to_string(), id.0.to_string());
			properties.insert(KEY_ORIGIN_ID.to_string(), origin.0.to_string());
			let handle = CapabilityHandle::new(
				id,
				Arc::new(HandleMeta {
					origin,
					rank: spec.rank,
					chain_internal: spec.chain_internal,
					properties,
				}),
			);
			state.publications.push(Publication {
				handle: handle.clone(),
				instance: Arc::clone(&instance),
			});
			let listeners = state.deliverable(&handle, &instance);
			(handle, listeners)
		};
		for listener in listeners {
			if let Err(fault) = listener.added(handle.clone(), Arc::clone(&instance)) {
				self.state.lock().faults.push(fault);
			}
		}
		handle
	}

	pub fn publish_plain(self: &Arc<Self>, instance: Instance) -> CapabilityHandle {
		self.publish(instance, Publish::default())
	}

	pub fn withdraw(self: &Arc<Self>, handle: &CapabilityHandle) {
		let (instance, listeners) = {
			let mut state = self.state.lock();
			let Some(position) = state
				.publications
				.iter()
				.position(|p| p.handle.id() == handle.id())
			else {
				return;
			};
			let publication = state.publications.remove(position);
			let listeners = state.deliverable(&publication.handle, &publication.instance);
			(publication.instance, listeners)
		};
		for listener in listeners {
			if let Err(fault) = listener.removed(handle.clone(), Arc::clone(&instance)) {
				self.state.lock().faults.push(fault);
			}
		}
	}

	/// Re-delivers a publication as modified.
	pub fn update(self: &Arc<Self>, handle: &CapabilityHandle) {
		let delivery = {
			let state = self.state.lock();
			state
				.publications
				.iter()
				.find(|p| p.handle.id() == handle.id())
				.map(|p| (Arc::clone(&p.instance), state.deliverable(&p.handle, &p.instance)))
		};
		let Some((instance, listeners)) = delivery else {
			return;
		};
		for listener in listeners {
			if let Err(fault) = listener.modified(handle.clone(), Arc::clone(&instance)) {
				self.state.lock().faults.push(fault);
			}
		}
	}

	pub fn subscribe_count(&self) -> usize {
		self.state.lock().subscribe_count
	}

	pub fn unsubscribe_count(&self) -> usize {
		self.state.lock().unsubscribe_count
	}

	pub fn releases(&self) -> Vec<CapabilityId> {
		self.state.lock().releases.clone()
	}

	pub fn faults(&self) -> Vec<TrackingFault> {
		self.state.lock().faults.clone()
	}
}

impl RegistryState {
	fn matches(selector: &Selector, publication: &Publication) -> bool {
		match selector {
			Selector::Type(capability) => capability.satisfied_by(&publication.instance),
			Selector::Filter { capability, filter } => {
				capability
					.as_ref()
					.map_or(true, |c| c.satisfied_by(&publication.instance))
					&& filter.matches(publication.handle.properties())
			}
			Selector::Pinned(pinned) => pinned.id() == publication.handle.id(),
		}
	}

	/// Listeners that should see a mutation of this publication, honoring
	/// decorator visibility.
	fn deliverable(
		&self,
		handle: &CapabilityHandle,
		instance: &Instance,
	) -> Vec<Arc<dyn CapabilityListener>> {
		let publication = Publication {
			handle: handle.clone(),
			instance: Arc::clone(instance),
		};
		let is_decorator = handle.origin().0 != handle.id().0;
		self.subscriptions
			.iter()
			.filter(|s| s.options.include_decorators || !is_decorator)
			.filter(|s| Self::matches(&s.selector, &publication))
			.map(|s| Arc::clone(&s.listener))
			.collect()
	}

	fn matching(&self, selector: &Selector) -> Vec<&Publication> {
		self.publications
			.iter()
			.filter(|p| Self::matches(selector, p))
			.collect()
	}
}

impl CapabilityRegistry for MockRegistry {
	fn subscribe(
		&self,
		selector: Selector,
		options: SubscribeOptions,
		listener: Arc<dyn CapabilityListener>,
	) -> SubscriptionId {
		let (id, existing) = {
			let mut state = self.state.lock();
			state.next_subscription += 1;
			state.subscribe_count += 1;
			let id = SubscriptionId(state.next_subscription);
			let is_visible = |p: &&Publication| {
				options.include_decorators || p.handle.origin().0 == p.handle.id().0
			};
			let existing: Vec<(CapabilityHandle, Instance)> = state
				.matching(&selector)
				.into_iter()
				.filter(is_visible)
				.map(|p| (p.handle.clone(), Arc::clone(&p.instance)))
				.collect();
			state.subscriptions.push(Subscription {
				id,
				selector,
				options,
				listener: Arc::clone(&listener),
			});
			(id, existing)
		};
		for (handle, instance) in existing {
			if let Err(fault) = listener.added(handle, instance) {
				self.state.lock().faults.push(fault);
			}
		}
		id
	}

	fn unsubscribe(&self, subscription: SubscriptionId) {
		let mut state = self.state.lock();
		state.unsubscribe_count += 1;
		state.subscriptions.retain(|s| s.id != subscription);
	}

	fn acquire(&self, handle: &CapabilityHandle) -> Option<Instance> {
		let state = self.state.lock();
		state
			.publications
			.iter()
			.find(|p| p.handle.id() == handle.id())
			.map(|p| Arc::clone(&p.instance))
	}

	fn release(&self, handle: &CapabilityHandle) {
		self.state.lock().releases.push(handle.id());
	}

	fn lookup(&self, selector: &Selector) -> Option<(CapabilityHandle, Instance)> {
		let state = self.state.lock();
		state
			.matching(selector)
			.into_iter()
			.max_by_key(|p| p.handle.rank())
			.map(|p| (p.handle.clone(), Arc::clone(&p.instance)))
	}

	fn matches(&self, selector: &Selector) -> Vec<CapabilityHandle> {
		let state = self.state.lock();
		state
			.matching(selector)
			.into_iter()
			.map(|p| p.handle.clone())
			.collect()
	}

	fn has_match(&self, selector: &Selector) -> bool {
		let state = self.state.lock();
		!state.matching(selector).is_empty()
	}
}

// ----- resource discovery -----

struct Registration {
	id: RegistrationId,
	selection: ResourceSelection,
	listener: Arc<dyn ResourceListener>,
}

#[derive(Default)]
struct DiscoveryState {
	next: u64,
	registrations: Vec<Registration>,
	resources: Vec<(Url, Option<ResourceProps>)>,
	register_count: usize,
	unregister_count: usize,
}

#[derive(Default)]
pub struct MockDiscovery {
	state: Mutex<DiscoveryState>,
}

impl MockDiscovery {
	pub fn new() -> Arc<Self> {
		Arc::default()
	}

	fn selected(selection: &ResourceSelection, locator: &Url, props: Option<&ResourceProps>) -> bool {
		match selection {
			ResourceSelection::Locator(pinned) => pinned == locator,
			ResourceSelection::Filter(filter) => {
				let empty = ResourceProps::new();
				filter.matches(props.unwrap_or(&empty))
			}
			ResourceSelection::All => true,
		}
	}

	fn listeners_for(
		&self,
		locator: &Url,
		props: Option<&ResourceProps>,
	) -> Vec<Arc<dyn ResourceListener>> {
		self.state
			.lock()
			.registrations
			.iter()
			.filter(|r| Self::selected(&r.selection, locator, props))
			.map(|r| Arc::clone(&r.listener))
			.collect()
	}

	pub fn add(&self, locator: &Url, props: Option<ResourceProps>) {
		self.state
			.lock()
			.resources
			.push((locator.clone(), props.clone()));
		for listener in self.listeners_for(locator, props.as_ref()) {
			listener.added(locator, props.as_ref());
		}
	}

	pub fn change(&self, locator: &Url, props: Option<ResourceProps>) {
		{
			let mut state = self.state.lock();
			if let Some(entry) = state.resources.iter_mut().find(|(l, _)| l == locator) {
				entry.1 = props.clone();
			}
		}
		for listener in self.listeners_for(locator, props.as_ref()) {
			listener.changed(locator, props.as_ref());
		}
	}

	pub fn remove(&self, locator: &Url) {
		let props = {
			let mut state = self.state.lock();
			let position = state.resources.iter().position(|(l, _)| l == locator);
			position.map(|p| state.resources.remove(p).1)
		};
		let props = props.flatten();
		for listener in self.listeners_for(locator, props.as_ref()) {
			listener.removed(locator, props.as_ref());
		}
	}

	/// Delivers a removal for a locator the discovery never announced.
	pub fn remove_unknown(&self, locator: &Url) {
		for listener in self.listeners_for(locator, None) {
			listener.removed(locator, None);
		}
	}

	pub fn register_count(&self) -> usize {
		self.state.lock().register_count
	}

	pub fn unregister_count(&self) -> usize {
		self.state.lock().unregister_count
	}
}

impl ResourceDiscovery for MockDiscovery {
	fn register(
		&self,
		selection: ResourceSelection,
		listener: Arc<dyn ResourceListener>,
	) -> RegistrationId {
		let (id, existing) = {
			let mut state = self.state.lock();
			state.next += 1;
			state.register_count += 1;
			let id = RegistrationId(state.next);
			let existing: Vec<(Url, Option<ResourceProps>)> = state
				.resources
				.iter()
				.filter(|(locator, props)| Self::selected(&selection, locator, props.as_ref()))
				.cloned()
				.collect();
			state.registrations.push(Registration {
				id,
				selection,
				listener: Arc::clone(&listener),
			});
			(id, existing)
		};
		for (locator, props) in existing {
			listener.added(&locator, props.as_ref());
		}
		id
	}

	fn unregister(&self, registration: RegistrationId) {
		let mut state = self.state.lock();
		state.unregister_count += 1;
		state.registrations.retain(|r| r.id != registration);
	}
}

// ----- consumer -----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
	Available,
	Unavailable,
	Changed,
}

pub struct MockConsumer {
	pub instantiated: AtomicBool,
	pub registered: AtomicBool,
	pub target: Arc<RecordingTarget>,
	lifecycle: Mutex<Vec<Lifecycle>>,
	component: Instance,
}

impl MockConsumer {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			instantiated: AtomicBool::new(true),
			registered: AtomicBool::new(true),
			target: Arc::new(RecordingTarget::default()),
			lifecycle: Mutex::new(Vec::new()),
			component: Arc::new(()),
		})
	}

	pub fn lifecycle(&self) -> Vec<Lifecycle> {
		self.lifecycle.lock().clone()
	}
}

impl DependencyConsumer for MockConsumer {
	fn dependency_available(&self, _dependency: &dyn Dependency) {
		self.lifecycle.lock().push(Lifecycle::Available);
	}

	fn dependency_unavailable(&self, _dependency: &dyn Dependency) {
		self.lifecycle.lock().push(Lifecycle::Unavailable);
	}

	fn dependency_changed(&self, _dependency: &dyn Dependency) {
		self.lifecycle.lock().push(Lifecycle::Changed);
	}

	fn is_instantiated(&self) -> bool {
		self.instantiated.load(Ordering::SeqCst)
	}

	fn is_registered(&self) -> bool {
		self.registered.load(Ordering::SeqCst)
	}

	fn composition_targets(&self) -> Vec<Arc<dyn CallbackTarget>> {
		vec![Arc::clone(&self.target) as Arc<dyn CallbackTarget>]
	}

	fn component(&self) -> Instance {
		Arc::clone(&self.component)
	}
}

/// Records callbacks, accepting the bare candidate shape (and swaps).
#[derive(Default)]
pub struct RecordingTarget {
	calls: Mutex<Vec<Recorded>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
	pub name: String,
	pub detail: String,
}

fn describe(candidate: &CandidateRef<'_>) -> String {
	match candidate {
		CandidateRef::Capability { handle, .. } => {
			format!("#{} rank {}", handle.id(), handle.rank())
		}
		CandidateRef::Resource { locator } => locator.to_string(),
	}
}

impl RecordingTarget {
	pub fn record(&self, name: &str, detail: String) {
		self.calls.lock().push(Recorded {
			name: name.to_string(),
			detail,
		});
	}

	pub fn calls(&self) -> Vec<Recorded> {
		self.calls.lock().clone()
	}

	pub fn names(&self) -> Vec<String> {
		self.calls.lock().iter().map(|c| c.name.clone()).collect()
	}

	pub fn count(&self, name: &str) -> usize {
		self.calls.lock().iter().filter(|c| c.name == name).count()
	}
}

impl CallbackTarget for RecordingTarget {
	fn invoke(&self, name: &str, call: &CallbackCall<'_>) -> InvokeOutcome {
		match call {
			CallbackCall::Candidate { candidate } => {
				self.record(name, describe(candidate));
				InvokeOutcome::Invoked
			}
			CallbackCall::Swapped {
				component: None,
				previous,
				current,
			} => {
				self.record(name, format!("{} -> {}", describe(previous), describe(current)));
				InvokeOutcome::Invoked
			}
			_ => InvokeOutcome::NoMatch,
		}
	}
}

// ----- shared fixtures -----

/// Builds a handle outside the mock registry, for driving listener entry
/// points directly.
pub fn handle(id: u64, rank: i32) -> CapabilityHandle {
	handle_with(id, rank, id, false)
}

pub fn handle_with(id: u64, rank: i32, origin: u64, chain_internal: bool) -> CapabilityHandle {
	let mut properties = ResourceProps::new();
	properties.insert(KEY_CAPABILITY_ID.to_string(), id.to_string());
	properties.insert(KEY_ORIGIN_ID.to_string(), origin.to_string());
	CapabilityHandle::new(
		CapabilityId(id),
		Arc::new(HandleMeta {
			origin: OriginId(origin),
			rank,
			chain_internal,
			properties,
		}),
	)
}

/// Concrete capability used across the tests; decorators publish the same
/// type so the whole chain satisfies one declared capability.
pub struct EchoService(pub &'static str);

/// A type no test tracker declares.
pub struct StrayService;

pub fn echo(tag: &'static str) -> Instance {
	Arc::new(EchoService(tag))
}

pub fn stray() -> Instance {
	Arc::new(StrayService)
}

pub fn locator(raw: &str) -> Url {
	Url::parse(raw).expect("test locator parses")
}

pub fn props(pairs: &[(&str, &str)]) -> ResourceProps {
	pairs
		.iter()
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.collect()
}
