//! Cross-process refresh lock: the [`Locker`] contract, bounded retry acquisition, and guards.

pub mod file;
pub mod memory;

pub use file::FileLocker;
pub use memory::MemoryLocker;

// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind},
};

/// Prefix of the lock guarding token refreshes.
pub const GET_TOKENS_LOCK: &str = "slashauth.lock.getTokens";

/// Boxed future returned by lockers.
pub type LockFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Named mutual exclusion shared by every client instance that can rotate the same tokens.
pub trait Locker
where
	Self: Send + Sync,
{
	/// Tries once to take `name` for at most `ttl`; resolves to `false` when someone else holds it.
	fn acquire<'a>(&'a self, name: &'a str, ttl: Duration) -> LockFuture<'a, bool>;

	/// Releases `name` if this locker holds it.
	fn release<'a>(&'a self, name: &'a str) -> LockFuture<'a, ()>;
}

/// Retry policy for [`acquire_with_retry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
	/// How long a hold stays valid if its owner never releases it.
	pub ttl: Duration,
	/// Total number of acquisition attempts.
	pub attempts: u32,
	/// Pause between attempts.
	pub backoff: Duration,
}
impl LockSettings {
	/// Rejects settings that could never acquire the lock.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.attempts == 0 || !self.ttl.is_positive() || self.backoff.is_negative() {
			return Err(ConfigError::InvalidLockSettings);
		}

		Ok(())
	}
}
impl Default for LockSettings {
	fn default() -> Self {
		Self { ttl: Duration::milliseconds(5_000), attempts: 10, backoff: Duration::milliseconds(100) }
	}
}

/// Name of the refresh lock for `client_id`.
pub fn get_tokens_lock_name(client_id: &str) -> String {
	format!("{GET_TOKENS_LOCK}::{client_id}")
}

/// Acquires `name`, retrying per `settings`; exhaustion yields [`Error::Timeout`].
///
/// A locker error counts as a failed attempt.
pub async fn acquire_with_retry(
	locker: Arc<dyn Locker>,
	name: impl Into<String>,
	settings: LockSettings,
) -> Result<LockGuard> {
	let name = name.into();

	for attempt in 0..settings.attempts {
		if attempt > 0 && settings.backoff.is_positive() {
			tokio::time::sleep(settings.backoff.unsigned_abs()).await;
		}

		match locker.acquire(&name, settings.ttl).await {
			Ok(true) => return Ok(LockGuard { locker, name, released: false }),
			Ok(false) => {
				obs::debug_event(FlowKind::Lock, "acquire", "Lock is held elsewhere.");
				obs::record_lock_contention();
			},
			Err(e) => obs::warn_event(FlowKind::Lock, "acquire", &format!("Lock attempt failed: {e}")),
		}
	}

	Err(Error::Timeout)
}

/// Proof of holding a lock.
///
/// Call [`release`](Self::release) on every path that can await. A guard dropped without it
/// schedules the release on the current tokio runtime; without a runtime the hold lapses after
/// its TTL.
pub struct LockGuard {
	locker: Arc<dyn Locker>,
	name: String,
	released: bool,
}
impl LockGuard {
	/// Name of the held lock.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Releases the lock.
	pub async fn release(mut self) -> Result<()> {
		self.released = true;

		self.locker.release(&self.name).await
	}
}
impl Debug for LockGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LockGuard").field("name", &self.name).field("released", &self.released).finish()
	}
}
impl Drop for LockGuard {
	fn drop(&mut self) {
		if self.released {
			return;
		}

		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			obs::warn_event(FlowKind::Lock, "release", "No runtime to release the lock; TTL applies.");

			return;
		};
		let locker = self.locker.clone();
		let name = std::mem::take(&mut self.name);

		handle.spawn(async move {
			if let Err(e) = locker.release(&name).await {
				obs::warn_event(FlowKind::Lock, "release", &format!("Deferred release failed: {e}"));
			}
		});
	}
}
