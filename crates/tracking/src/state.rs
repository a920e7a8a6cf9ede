//! Dependency activation status encoding.

use std::fmt;

/// Status a dependency reports to its owning component.
///
/// Before tracking starts only the declaration matters; once started, the
/// status combines the required flag with live availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyState {
	/// Declared required; tracking not started.
	Required,
	/// Declared optional; tracking not started.
	Optional,
	UnsatisfiedOptional,
	SatisfiedOptional,
	UnsatisfiedRequired,
	SatisfiedRequired,
}

impl DependencyState {
	/// Computes the status from the current flags.
	pub fn of(started: bool, available: bool, required: bool) -> Self {
		if !started {
			return if required { Self::Required } else { Self::Optional };
		}
		match (available, required) {
			(false, false) => Self::UnsatisfiedOptional,
			(true, false) => Self::SatisfiedOptional,
			(false, true) => Self::UnsatisfiedRequired,
			(true, true) => Self::SatisfiedRequired,
		}
	}

	/// Whether the dependency is currently satisfied. Unstarted dependencies
	/// are not.
	pub fn is_satisfied(self) -> bool {
		matches!(self, Self::SatisfiedOptional | Self::SatisfiedRequired)
	}
}

impl fmt::Display for DependencyState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Required => "required",
			Self::Optional => "optional",
			Self::UnsatisfiedOptional => "unsatisfied (optional)",
			Self::SatisfiedOptional => "satisfied (optional)",
			Self::UnsatisfiedRequired => "unsatisfied (required)",
			Self::SatisfiedRequired => "satisfied (required)",
		})
	}
}

/// Flags shared by every dependency implementation.
///
/// `required` and `instance_bound` are declaration-time configuration;
/// `started` flips when the underlying subscription opens and closes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BaseState {
	pub required: bool,
	pub instance_bound: bool,
	pub started: bool,
}

impl BaseState {
	pub fn new() -> Self {
		Self {
			required: false,
			instance_bound: false,
			started: false,
		}
	}

	/// Declaration flags carried over to a fresh, unstarted copy. Runtime
	/// state never survives copying; a copy is a template for a new component
	/// instance.
	pub fn template(&self) -> Self {
		Self {
			required: self.required,
			instance_bound: self.instance_bound,
			started: false,
		}
	}

	pub fn state(&self, available: bool) -> DependencyState {
		DependencyState::of(self.started, available, self.required)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_all_six_states() {
		assert_eq!(DependencyState::of(false, false, true), DependencyState::Required);
		assert_eq!(DependencyState::of(false, true, true), DependencyState::Required);
		assert_eq!(DependencyState::of(false, false, false), DependencyState::Optional);
		assert_eq!(
			DependencyState::of(true, false, false),
			DependencyState::UnsatisfiedOptional
		);
		assert_eq!(
			DependencyState::of(true, true, false),
			DependencyState::SatisfiedOptional
		);
		assert_eq!(
			DependencyState::of(true, false, true),
			DependencyState::UnsatisfiedRequired
		);
		assert_eq!(
			DependencyState::of(true, true, true),
			DependencyState::SatisfiedRequired
		);
	}

	#[test]
	fn unstarted_states_are_never_satisfied() {
		assert!(!DependencyState::Required.is_satisfied());
		assert!(!DependencyState::Optional.is_satisfied());
		assert!(DependencyState::SatisfiedRequired.is_satisfied());
	}

	#[test]
	fn template_keeps_declaration_but_not_runtime_flags() {
		let base = BaseState {
			required: true,
			instance_bound: true,
			started: true,
		};
		let copy = base.template();
		assert!(copy.required);
		assert!(copy.instance_bound);
		assert!(!copy.started);
	}
}
