//! Fatal faults crossing the listener contract.

use crate::handle::OriginId;

/// Invariant violations raised while processing a candidate notification or
/// lookup. These are never recovered internally; the caller owning the
/// delivery marks the affected component unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackingFault {
	/// Two candidates in the same decoration chain reported the same rank
	/// during a swap; the active candidate would be ambiguous.
	#[error("swap between candidates of equal rank {rank} for origin {origin}")]
	EqualRankSwap { origin: OriginId, rank: i32 },

	/// A service lookup was attempted on a dependency with no declared
	/// capability selection.
	#[error("capability lookup without a declared type, filter, or pinned handle")]
	NothingDeclared,
}
