//! Registry-facing contract for capability and resource tracking.
//!
//! The dependency trackers in `tether-tracking` consume externally owned
//! registries through the narrow traits defined here: a capability registry
//! publishing typed, rank-ordered instances, and a resource discovery service
//! publishing locator-addressed resources. Publish/subscribe mechanics live
//! behind these traits and are out of scope for this workspace.

mod capability;
mod error;
mod filter;
mod handle;
mod registry;
mod resource;
mod selector;

pub use capability::{CapabilityType, Instance, Placeholder};
pub use error::TrackingFault;
pub use filter::{Filter, FilterParseError};
pub use handle::{
	CapabilityHandle, CapabilityId, HandleMeta, KEY_CAPABILITY_ID, KEY_ORIGIN_ID, OriginId,
};
pub use registry::{CapabilityListener, CapabilityRegistry, SubscriptionId};
pub use resource::{
	RESOURCE_HOST, RESOURCE_PATH, RESOURCE_PORT, RESOURCE_PROTOCOL, RegistrationId,
	ResourceDiscovery, ResourceListener, ResourceProps, ResourceSelection,
};
pub use selector::{Selector, SubscribeOptions};
