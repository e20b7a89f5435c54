// self
use crate::obs::{FlowKind, FlowOutcome};

/// Why a cache entry was deleted by a prune.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PruneReason {
	/// The stored value no longer deserializes.
	Corrupt,
	/// The access token expired and no refresh token is kept.
	Expired,
}
impl PruneReason {
	/// Returns a stable label for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PruneReason::Corrupt => "corrupt",
			PruneReason::Expired => "expired",
		}
	}
}

/// Increments `slashauth_flow_total{flow, outcome}` when the `metrics` feature is enabled.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"slashauth_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts refresh-lock attempts that found the lock held elsewhere.
pub fn record_lock_contention() {
	#[cfg(feature = "metrics")]
	metrics::counter!("slashauth_lock_contended_total").increment(1);
}

/// Counts cache entries deleted on sight.
pub fn record_cache_prune(reason: PruneReason) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("slashauth_cache_pruned_total", "reason" => reason.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = reason;
	}
}
