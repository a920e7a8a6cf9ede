//! Resource discovery contract for locator-addressed resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use url::Url;

use crate::filter::Filter;

/// Properties published alongside a discovered resource.
pub type ResourceProps = BTreeMap<String, String>;

/// Reserved property key: locator host.
pub const RESOURCE_HOST: &str = "host";
/// Reserved property key: locator path.
pub const RESOURCE_PATH: &str = "path";
/// Reserved property key: locator scheme.
pub const RESOURCE_PROTOCOL: &str = "protocol";
/// Reserved property key: locator port.
pub const RESOURCE_PORT: &str = "port";

/// Identifies one discovery registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u64);

/// What a discovery registration is interested in.
#[derive(Debug, Clone)]
pub enum ResourceSelection {
	/// Exactly one resource, by locator.
	Locator(Url),
	/// Resources whose properties satisfy the filter.
	Filter(Filter),
	/// Every discovered resource.
	All,
}

/// Receives resource notifications for one registration. Delivery is
/// serialized per registration, as for capability subscriptions.
pub trait ResourceListener: Send + Sync {
	fn added(&self, locator: &Url, props: Option<&ResourceProps>);
	fn changed(&self, locator: &Url, props: Option<&ResourceProps>);
	fn removed(&self, locator: &Url, props: Option<&ResourceProps>);
}

/// Narrow resource-discovery surface used by trackers.
pub trait ResourceDiscovery: Send + Sync {
	/// Registers interest. Already-known matching resources are delivered
	/// through the listener before other mutations, on the calling thread.
	fn register(
		&self,
		selection: ResourceSelection,
		listener: Arc<dyn ResourceListener>,
	) -> RegistrationId;

	/// Drops a registration. No further notifications are delivered once
	/// this returns.
	fn unregister(&self, registration: RegistrationId);
}
