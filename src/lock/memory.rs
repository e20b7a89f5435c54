//! In-process [`Locker`] for clients that share one process.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	lock::{LockFuture, Locker},
};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug)]
struct Hold {
	owner: u64,
	expires_at: OffsetDateTime,
}

/// Lock table keyed by name; holds lapse at their expiry instant.
///
/// Clones share the same table but act as distinct owners, so one table can be handed to several
/// clients. A handle only releases holds it took itself.
pub struct MemoryLocker {
	held: Arc<Mutex<HashMap<String, Hold>>>,
	clock: Arc<dyn Clock>,
	owner: u64,
}
impl MemoryLocker {
	/// Creates a locker whose TTLs follow `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { held: Default::default(), clock, owner: next_owner() }
	}

	/// Returns `true` while `name` is held and unexpired.
	pub fn is_held(&self, name: &str) -> bool {
		let now = self.clock.now();

		self.held.lock().get(name).is_some_and(|hold| hold.expires_at > now)
	}
}
impl Clone for MemoryLocker {
	fn clone(&self) -> Self {
		Self { held: self.held.clone(), clock: self.clock.clone(), owner: next_owner() }
	}
}
impl Default for MemoryLocker {
	fn default() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}
}
impl Debug for MemoryLocker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryLocker").field("held", &self.held.lock().len()).finish()
	}
}
impl Locker for MemoryLocker {
	fn acquire<'a>(&'a self, name: &'a str, ttl: Duration) -> LockFuture<'a, bool> {
		Box::pin(async move {
			let now = self.clock.now();
			let mut held = self.held.lock();

			if held.get(name).is_some_and(|hold| hold.expires_at > now) {
				return Ok(false);
			}

			held.insert(name.to_owned(), Hold { owner: self.owner, expires_at: now + ttl });

			Ok(true)
		})
	}

	fn release<'a>(&'a self, name: &'a str) -> LockFuture<'a, ()> {
		Box::pin(async move {
			let mut held = self.held.lock();

			if held.get(name).is_some_and(|hold| hold.owner == self.owner) {
				held.remove(name);
			}

			Ok(())
		})
	}
}

fn next_owner() -> u64 {
	NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
}
