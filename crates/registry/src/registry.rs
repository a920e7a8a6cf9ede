//! The capability registry contract consumed by dependency trackers.

use std::sync::Arc;

use crate::capability::Instance;
use crate::error::TrackingFault;
use crate::handle::CapabilityHandle;
use crate::selector::{Selector, SubscribeOptions};

/// Identifies one open subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives candidate notifications for one subscription.
///
/// The registry serializes delivery per subscription: no two calls for the
/// same listener overlap. Each `added` delivery transfers one acquisition of
/// the instance; the listener releases it (via
/// [`CapabilityRegistry::release`]) once it is done with the candidate, on
/// removal or on rejection.
///
/// An `Err` return signals a fatal tracking fault; the registry propagates it
/// to whoever owns the delivery, it is never swallowed.
pub trait CapabilityListener: Send + Sync {
	fn added(&self, handle: CapabilityHandle, instance: Instance) -> Result<(), TrackingFault>;
	fn modified(&self, handle: CapabilityHandle, instance: Instance) -> Result<(), TrackingFault>;
	fn removed(&self, handle: CapabilityHandle, instance: Instance) -> Result<(), TrackingFault>;
}

/// Narrow registry surface used by trackers.
///
/// Query methods (`lookup`, `matches`, `has_match`) are synchronous and
/// non-blocking snapshots of current publications. `lookup` peeks without
/// transferring an acquisition; instances obtained from it stay valid while
/// their handle remains published. Notifications are delivered after the
/// state mutation is visible to the query methods, so a listener handling a
/// removal observes the post-removal registry.
pub trait CapabilityRegistry: Send + Sync {
	/// Opens a subscription. Existing matches are delivered through the
	/// listener before other mutations, on the calling thread.
	fn subscribe(
		&self,
		selector: Selector,
		options: SubscribeOptions,
		listener: Arc<dyn CapabilityListener>,
	) -> SubscriptionId;

	/// Closes a subscription. No further notifications are delivered once
	/// this returns.
	fn unsubscribe(&self, subscription: SubscriptionId);

	/// Acquires the instance behind a handle, counting one acquisition.
	fn acquire(&self, handle: &CapabilityHandle) -> Option<Instance>;

	/// Gives back one acquisition of a handle's instance.
	fn release(&self, handle: &CapabilityHandle);

	/// The highest-ranked publication matching the selector, if any.
	fn lookup(&self, selector: &Selector) -> Option<(CapabilityHandle, Instance)>;

	/// All publications currently matching the selector.
	fn matches(&self, selector: &Selector) -> Vec<CapabilityHandle>;

	/// Whether any publication currently matches the selector.
	fn has_match(&self, selector: &Selector) -> bool;
}
