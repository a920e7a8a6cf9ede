//! Candidate selection for registry subscriptions.

use std::fmt;

use crate::capability::CapabilityType;
use crate::filter::Filter;
use crate::handle::CapabilityHandle;

/// What a subscription or query selects among published capabilities.
#[derive(Debug, Clone)]
pub enum Selector {
	/// Every publication of the declared type.
	Type(CapabilityType),
	/// Publications whose properties satisfy the filter, optionally further
	/// narrowed to a declared type.
	Filter {
		capability: Option<CapabilityType>,
		filter: Filter,
	},
	/// Exactly one pinned publication.
	Pinned(CapabilityHandle),
}

impl Selector {
	/// The declared capability type, when the selection carries one.
	pub fn capability(&self) -> Option<&CapabilityType> {
		match self {
			Self::Type(capability) => Some(capability),
			Self::Filter { capability, .. } => capability.as_ref(),
			Self::Pinned(_) => None,
		}
	}
}

impl fmt::Display for Selector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Type(capability) => write!(f, "{capability}"),
			Self::Filter {
				capability: Some(capability),
				filter,
			} => write!(f, "{capability} {filter}"),
			Self::Filter {
				capability: None,
				filter,
			} => write!(f, "{filter}"),
			Self::Pinned(handle) => write!(f, "{handle}"),
		}
	}
}

/// Options applied when opening a subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
	/// Deliver decorator publications alongside their origins. Off by
	/// default; the registry then surfaces only undecorated capabilities.
	pub include_decorators: bool,
}
