// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Counters for refresh-token grants issued by one client.
///
/// Only calls that reach the token endpoint (or find no refresh token to send) are counted;
/// cache hits, including those found after waiting on the refresh lock, are not.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	session_ends: AtomicU64,
}
impl RefreshMetrics {
	/// Refresh grants started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Refresh grants that produced a new cache entry.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Refresh grants that failed for any reason.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Failures that ended the local session (no refresh token, or a 401/403 answer).
	pub fn session_ends(&self) -> u64 {
		self.session_ends.load(Ordering::Relaxed)
	}

	/// Point-in-time copy of every counter.
	pub fn snapshot(&self) -> RefreshSnapshot {
		RefreshSnapshot {
			attempts: self.attempts(),
			successes: self.successes(),
			failures: self.failures(),
			session_ends: self.session_ends(),
		}
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_outcome<T>(&self, outcome: &Result<T>) {
		match outcome {
			Ok(_) => {
				self.successes.fetch_add(1, Ordering::Relaxed);
			},
			Err(e) => {
				self.failures.fetch_add(1, Ordering::Relaxed);

				if e.is_unauthorized() || matches!(e, Error::NotLoggedIn) {
					self.session_ends.fetch_add(1, Ordering::Relaxed);
				}
			},
		}
	}
}

/// Serializable copy of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSnapshot {
	/// Refresh grants started.
	pub attempts: u64,
	/// Refresh grants that produced a new cache entry.
	pub successes: u64,
	/// Refresh grants that failed.
	pub failures: u64,
	/// Failures that ended the local session.
	pub session_ends: u64,
}
