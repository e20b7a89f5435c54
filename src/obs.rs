//! Structured logging and counters for client operations.
//!
//! With the `tracing` feature, operations run inside `slashauth.flow` spans (fields `flow` and
//! `stage`, plus `audience` and `scope` for key-scoped work) and recoverable failures are logged
//! as warnings. With the `metrics` feature, these counters are exported:
//!
//! - `slashauth_flow_total{flow, outcome}`
//! - `slashauth_lock_contended_total`
//! - `slashauth_cache_pruned_total{reason}`
//!
//! Both features compile to no-ops when disabled.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// `get_tokens` and its wrappers.
	GetTokens,
	/// Refresh-token grant under the refresh lock.
	Refresh,
	/// Authorization code exchange and external token processing.
	Login,
	/// Local logout.
	Logout,
	/// Cache maintenance (pruning, manifest repair).
	Cache,
	/// Refresh lock acquisition.
	Lock,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::GetTokens => "get_tokens",
			FlowKind::Refresh => "refresh",
			FlowKind::Login => "login",
			FlowKind::Logout => "logout",
			FlowKind::Cache => "cache",
			FlowKind::Lock => "lock",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a client operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
