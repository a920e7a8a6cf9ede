//! Declared capability types and published instances.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A published capability instance, type-erased for transport through the
/// registry.
///
/// Trait-shaped capabilities are published as an `Arc<dyn Trait>` wrapped in
/// the erased `Arc`, so every decorator of the same capability carries the
/// same concrete type and satisfies the same declared [`CapabilityType`].
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Factory producing an inert stand-in for a capability type.
pub type Placeholder = fn() -> Instance;

/// Declared type of a tracked capability.
///
/// Carries the runtime type check used for candidate admission and,
/// optionally, a placeholder factory used when nothing is bound and
/// auto-configuration is on.
#[derive(Clone, Copy)]
pub struct CapabilityType {
	name: &'static str,
	id: TypeId,
	placeholder: Option<Placeholder>,
}

impl CapabilityType {
	/// Declares a capability type without a placeholder.
	pub fn of<T: Any>(name: &'static str) -> Self {
		Self {
			name,
			id: TypeId::of::<T>(),
			placeholder: None,
		}
	}

	/// Declares a capability type with a no-op placeholder used as the last
	/// resort of service lookup.
	pub fn with_placeholder<T: Any>(name: &'static str, placeholder: Placeholder) -> Self {
		Self {
			name,
			id: TypeId::of::<T>(),
			placeholder: Some(placeholder),
		}
	}

	#[inline]
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Whether the instance is of the declared type.
	pub fn satisfied_by(&self, instance: &Instance) -> bool {
		instance.as_ref().type_id() == self.id
	}

	/// Produces the placeholder instance, if one was declared.
	pub fn placeholder(&self) -> Option<Instance> {
		self.placeholder.map(|factory| factory())
	}
}

impl PartialEq for CapabilityType {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for CapabilityType {}

impl fmt::Debug for CapabilityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CapabilityType")
			.field("name", &self.name)
			.field("placeholder", &self.placeholder.is_some())
			.finish()
	}
}

impl fmt::Display for CapabilityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}
