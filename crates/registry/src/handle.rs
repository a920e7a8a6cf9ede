//! Registry-issued handles for published capabilities.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Unique identity of one capability publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityId(pub u64);

/// Stable identity shared by an undecorated capability and all of its
/// rank-ordered decorators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OriginId(pub u64);

impl fmt::Display for CapabilityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Display for OriginId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Property key under which the registry mirrors [`CapabilityId`].
pub const KEY_CAPABILITY_ID: &str = "capability.id";

/// Property key under which the registry mirrors [`OriginId`].
pub const KEY_ORIGIN_ID: &str = "capability.origin";

/// Metadata published alongside a capability.
///
/// Owned by the registry; handles share it through an [`Arc`].
#[derive(Debug)]
pub struct HandleMeta {
	/// Origin identity; equals the publication's own id for an undecorated
	/// capability.
	pub origin: OriginId,
	/// Preference order among decorators of the same origin. Higher wins.
	/// Defaults to 0.
	pub rank: i32,
	/// Set by the decoration-chain machinery on its own synthetic
	/// publications so trackers can keep them out of chain bookkeeping.
	pub chain_internal: bool,
	/// Free-form publication properties, including the reserved identity
	/// mirrors.
	pub properties: BTreeMap<String, String>,
}

/// Opaque reference to one published capability.
///
/// Equality and hashing follow the publication id only; metadata is carried
/// for filtering and propagation.
#[derive(Debug, Clone)]
pub struct CapabilityHandle {
	id: CapabilityId,
	meta: Arc<HandleMeta>,
}

impl CapabilityHandle {
	pub fn new(id: CapabilityId, meta: Arc<HandleMeta>) -> Self {
		Self { id, meta }
	}

	#[inline]
	pub fn id(&self) -> CapabilityId {
		self.id
	}

	#[inline]
	pub fn origin(&self) -> OriginId {
		self.meta.origin
	}

	#[inline]
	pub fn rank(&self) -> i32 {
		self.meta.rank
	}

	#[inline]
	pub fn is_chain_internal(&self) -> bool {
		self.meta.chain_internal
	}

	#[inline]
	pub fn properties(&self) -> &BTreeMap<String, String> {
		&self.meta.properties
	}

	/// Looks up a single published property.
	pub fn property(&self, key: &str) -> Option<&str> {
		self.meta.properties.get(key).map(String::as_str)
	}
}

impl PartialEq for CapabilityHandle {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for CapabilityHandle {}

impl std::hash::Hash for CapabilityHandle {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Display for CapabilityHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "capability#{}", self.id)
	}
}
