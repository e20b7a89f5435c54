//! Directory-backed [`Locker`] that serializes refreshes across processes.

// std
use std::{
	fs::{self, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	cache::StoreError,
	clock::{Clock, SystemClock},
	lock::{LockFuture, Locker},
	obs::{self, FlowKind},
};

/// Directory name used for lock files kept next to a file-backed cache.
pub const LOCK_DIR: &str = ".slashauth-locks";

/// Lock directory that sits next to the file at `path`.
pub fn lock_dir_beside(path: &Path) -> PathBuf {
	path.parent().map(|dir| dir.join(LOCK_DIR)).unwrap_or_else(|| LOCK_DIR.into())
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct LockRecord {
	owner: String,
	expires_at: OffsetDateTime,
}

/// One lock file per name, created exclusively.
///
/// The file records its owner and expiry instant, so a crashed holder blocks others for at most
/// one TTL. Only the owner that created a file removes it on release.
pub struct FileLocker {
	dir: PathBuf,
	owner: String,
	clock: Arc<dyn Clock>,
}
impl FileLocker {
	/// Creates a locker storing its files under `dir`.
	pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
		Self::with_clock(dir, Arc::new(SystemClock))
	}

	/// Creates a locker whose TTLs follow `clock`.
	pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| backend(format!("Failed to create {}: {e}", dir.display())))?;

		let owner = rand::rng().sample_iter(&Alphanumeric).take(24).map(char::from).collect();

		Ok(Self { dir, owner, clock })
	}

	/// Directory holding the lock files.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, name: &str) -> PathBuf {
		let digest = Sha256::digest(name.as_bytes());

		self.dir.join(format!("{}.lock", URL_SAFE_NO_PAD.encode(digest)))
	}

	fn try_create(&self, path: &Path, ttl: Duration) -> Result<bool> {
		let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
			Ok(file) => file,
			Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
			Err(e) => return Err(backend(format!("Failed to create {}: {e}", path.display()))),
		};
		let record = LockRecord { owner: self.owner.clone(), expires_at: self.clock.now() + ttl };
		let raw = serde_json::to_vec(&record)
			.map_err(|e| Error::from(StoreError::Serialization { message: e.to_string() }))?;

		file.write_all(&raw)
			.and_then(|_| file.sync_all())
			.map_err(|e| backend(format!("Failed to write {}: {e}", path.display())))?;

		Ok(true)
	}

	// An unreadable record may belong to a holder that is still writing it, so it only counts as
	// stale once the file is older than the TTL.
	fn is_stale(&self, record: Option<&LockRecord>, path: &Path, ttl: Duration) -> bool {
		if let Some(record) = record {
			return record.expires_at <= self.clock.now();
		}

		fs::metadata(path)
			.and_then(|meta| meta.modified())
			.ok()
			.and_then(|modified| modified.elapsed().ok())
			.is_some_and(|age| age >= ttl.unsigned_abs())
	}

	// Moves the lock file aside under a name owned by this locker, then checks that the moved file
	// is still the one judged stale. A lock created by someone else in between is linked back.
	fn take_over(&self, path: &Path, judged: Option<&LockRecord>) -> Result<bool> {
		let tombstone = path.with_extension(format!("{}.stale", self.owner));

		match fs::rename(path, &tombstone) {
			Ok(()) => {},
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
			Err(e) => return Err(backend(format!("Failed to move {}: {e}", path.display()))),
		}

		let unchanged = read_record(&tombstone).as_ref() == judged;

		if !unchanged {
			obs::debug_event(FlowKind::Lock, "take_over", "Lock changed hands; restoring it.");

			if let Err(e) = fs::hard_link(&tombstone, path) {
				obs::warn_event(
					FlowKind::Lock,
					"take_over",
					&format!("Failed to restore {}: {e}", path.display()),
				);
			}
		}

		match fs::remove_file(&tombstone) {
			Err(e) if e.kind() != ErrorKind::NotFound =>
				Err(backend(format!("Failed to remove {}: {e}", tombstone.display()))),
			_ => Ok(unchanged),
		}
	}
}
impl Debug for FileLocker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FileLocker").field("dir", &self.dir).finish_non_exhaustive()
	}
}
impl Locker for FileLocker {
	fn acquire<'a>(&'a self, name: &'a str, ttl: Duration) -> LockFuture<'a, bool> {
		Box::pin(async move {
			let path = self.path_for(name);

			if self.try_create(&path, ttl)? {
				return Ok(true);
			}

			let judged = read_record(&path);

			if !self.is_stale(judged.as_ref(), &path, ttl) {
				return Ok(false);
			}
			if !self.take_over(&path, judged.as_ref())? {
				return Ok(false);
			}

			self.try_create(&path, ttl)
		})
	}

	fn release<'a>(&'a self, name: &'a str) -> LockFuture<'a, ()> {
		Box::pin(async move {
			let path = self.path_for(name);

			if read_record(&path).is_none_or(|record| record.owner != self.owner) {
				return Ok(());
			}

			match fs::remove_file(&path) {
				Err(e) if e.kind() != ErrorKind::NotFound =>
					Err(backend(format!("Failed to remove {}: {e}", path.display()))),
				_ => Ok(()),
			}
		})
	}
}

fn read_record(path: &Path) -> Option<LockRecord> {
	fs::read(path).ok().and_then(|raw| serde_json::from_slice(&raw).ok())
}

fn backend(message: String) -> Error {
	StoreError::Backend { message }.into()
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::clock::ManualClock;

	fn temp_dir(tag: &str) -> PathBuf {
		env::temp_dir().join(format!(
			"slashauth_file_locker_{tag}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		))
	}

	#[tokio::test]
	async fn lockers_sharing_a_directory_exclude_each_other() {
		let dir = temp_dir("shared");
		let clock = Arc::new(ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC)));
		let first = FileLocker::with_clock(&dir, clock.clone()).expect("First locker.");
		let second = FileLocker::with_clock(&dir, clock.clone()).expect("Second locker.");
		let ttl = Duration::seconds(5);

		assert!(first.acquire("refresh", ttl).await.expect("First acquire."));
		assert!(!second.acquire("refresh", ttl).await.expect("Contended acquire."));

		second.release("refresh").await.expect("Foreign release is a no-op.");

		assert!(!second.acquire("refresh", ttl).await.expect("Still held by the first owner."));

		clock.advance(Duration::seconds(6));

		assert!(second.acquire("refresh", ttl).await.expect("Expired hold is taken over."));

		second.release("refresh").await.expect("Owner release.");

		assert!(first.acquire("refresh", ttl).await.expect("Released lock is free."));

		fs::remove_dir_all(&dir).unwrap_or_else(|e| {
			panic!("Failed to remove temporary lock directory {}: {e}", dir.display())
		});
	}

	#[tokio::test]
	async fn takeover_backs_off_when_the_lock_changed_hands() {
		let dir = temp_dir("takeover");
		let clock = Arc::new(ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC)));
		let crashed = FileLocker::with_clock(&dir, clock.clone()).expect("Crashed locker.");
		let late = FileLocker::with_clock(&dir, clock.clone()).expect("Late locker.");
		let winner = FileLocker::with_clock(&dir, clock.clone()).expect("Winning locker.");
		let ttl = Duration::seconds(5);
		let path = late.path_for("refresh");

		assert!(crashed.acquire("refresh", ttl).await.expect("First acquire."));

		clock.advance(Duration::seconds(6));

		let judged = read_record(&path);

		assert!(late.is_stale(judged.as_ref(), &path, ttl));
		assert!(winner.acquire("refresh", ttl).await.expect("Stale hold is taken over."));
		assert!(!late.take_over(&path, judged.as_ref()).expect("Takeover should not fail."));
		assert_eq!(read_record(&path).map(|record| record.owner), Some(winner.owner.clone()));
		assert!(!late.acquire("refresh", ttl).await.expect("The winner still holds the lock."));
		assert_eq!(fs::read_dir(&dir).expect("Lock directory should list.").count(), 1);

		fs::remove_dir_all(&dir).unwrap_or_else(|e| {
			panic!("Failed to remove temporary lock directory {}: {e}", dir.display())
		});
	}
}
