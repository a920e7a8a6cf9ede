//! User callback dispatch.
//!
//! Trackers describe each callback as an ordered list of argument shapes,
//! richest first, ending with the zero-argument fallback. Each composition
//! target accepts the first shape it recognizes; targets that know nothing
//! about the callback name stay silent.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use tether_registry::{CapabilityHandle, Instance, ResourceProps};

/// Opaque component context handed back to user callbacks.
pub type ComponentCtx = dyn Any + Send + Sync;

/// The candidate a callback is about.
#[derive(Clone, Copy)]
pub enum CandidateRef<'a> {
	Capability {
		handle: &'a CapabilityHandle,
		instance: &'a Instance,
	},
	Resource {
		locator: &'a Url,
	},
}

/// The bare bound value, without registry bookkeeping attached.
#[derive(Clone, Copy)]
pub enum InstanceRef<'a> {
	Capability(&'a Instance),
	Resource(&'a Url),
}

/// One argument shape offered to a callback target.
pub enum CallbackCall<'a> {
	ContextCandidateProps {
		component: &'a ComponentCtx,
		candidate: CandidateRef<'a>,
		props: Option<&'a ResourceProps>,
	},
	ContextCandidate {
		component: &'a ComponentCtx,
		candidate: CandidateRef<'a>,
	},
	Context {
		component: &'a ComponentCtx,
	},
	CandidateProps {
		candidate: CandidateRef<'a>,
		props: Option<&'a ResourceProps>,
	},
	Candidate {
		candidate: CandidateRef<'a>,
	},
	Instance {
		instance: InstanceRef<'a>,
	},
	/// The active candidate of a decoration chain changed.
	Swapped {
		component: Option<&'a ComponentCtx>,
		previous: CandidateRef<'a>,
		current: CandidateRef<'a>,
	},
	NoArgs,
}

/// Outcome of offering one shape to one target.
pub enum InvokeOutcome {
	/// The target handled the callback.
	Invoked,
	/// The target has no method for this name/shape pair.
	NoMatch,
	/// The target matched but failed. The failure is logged and delivery
	/// continues with the remaining targets.
	Failed(Box<dyn std::error::Error + Send + Sync>),
}

/// Receives user-declared dependency callbacks.
pub trait CallbackTarget: Send + Sync {
	fn invoke(&self, name: &str, call: &CallbackCall<'_>) -> InvokeOutcome;
}

/// Offers the shapes to every target in order. Within one target the first
/// recognized shape wins; a failure counts as delivered for that target.
pub fn deliver(targets: &[Arc<dyn CallbackTarget>], name: &str, calls: &[CallbackCall<'_>]) {
	let mut delivered = false;
	for target in targets {
		for call in calls {
			match target.invoke(name, call) {
				InvokeOutcome::Invoked => {
					delivered = true;
					break;
				}
				InvokeOutcome::Failed(cause) => {
					warn!(callback = name, %cause, "user callback failed");
					delivered = true;
					break;
				}
				InvokeOutcome::NoMatch => {}
			}
		}
	}
	if !delivered {
		debug!(callback = name, "no composition target accepted callback");
	}
}

/// User-declared callback names for one dependency, plus the optional
/// external target they are delivered to instead of the component's
/// composition instances.
#[derive(Clone, Default)]
pub struct Callbacks {
	target: Option<Arc<dyn CallbackTarget>>,
	added: Option<Box<str>>,
	changed: Option<Box<str>>,
	removed: Option<Box<str>>,
	swapped: Option<Box<str>>,
}

impl Callbacks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Delivers callbacks to this target instead of the component's
	/// composition instances.
	pub fn on(mut self, target: Arc<dyn CallbackTarget>) -> Self {
		self.target = Some(target);
		self
	}

	pub fn added(mut self, name: impl Into<Box<str>>) -> Self {
		self.added = Some(name.into());
		self
	}

	pub fn changed(mut self, name: impl Into<Box<str>>) -> Self {
		self.changed = Some(name.into());
		self
	}

	pub fn removed(mut self, name: impl Into<Box<str>>) -> Self {
		self.removed = Some(name.into());
		self
	}

	/// Declares the swap callback, switching the dependency into
	/// decoration-chain mode.
	pub fn swapped(mut self, name: impl Into<Box<str>>) -> Self {
		self.swapped = Some(name.into());
		self
	}

	pub(crate) fn target(&self) -> Option<Arc<dyn CallbackTarget>> {
		self.target.clone()
	}

	pub(crate) fn added_name(&self) -> Option<&str> {
		self.added.as_deref()
	}

	pub(crate) fn changed_name(&self) -> Option<&str> {
		self.changed.as_deref()
	}

	pub(crate) fn removed_name(&self) -> Option<&str> {
		self.removed.as_deref()
	}

	pub(crate) fn swapped_name(&self) -> Option<&str> {
		self.swapped.as_deref()
	}

	pub(crate) fn has_swapped(&self) -> bool {
		self.swapped.is_some()
	}

	pub(crate) fn any_declared(&self) -> bool {
		self.added.is_some()
			|| self.changed.is_some()
			|| self.removed.is_some()
			|| self.swapped.is_some()
	}
}

impl std::fmt::Debug for Callbacks {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Callbacks")
			.field("target", &self.target.is_some())
			.field("added", &self.added)
			.field("changed", &self.changed)
			.field("removed", &self.removed)
			.field("swapped", &self.swapped)
			.finish()
	}
}
