//! Durable JSON-file [`CacheStore`] that several processes can share.

// std
use std::{
	collections::BTreeMap,
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
	process,
};
// self
use crate::{
	_prelude::*,
	cache::{CacheStore, EnumerableStore, StoreError, StoreFuture},
	lock::{self, FileLocker, LockSettings},
	obs::{self, FlowKind},
};

type Snapshot = BTreeMap<String, String>;

const WRITE_LOCK: LockSettings = LockSettings {
	ttl: Duration::seconds(2),
	attempts: 200,
	backoff: Duration::milliseconds(10),
};

/// Persists the whole key space as one JSON object.
///
/// Every operation re-reads the file so writes made by other processes are visible immediately.
/// Each write is a read-modify-write of the snapshot taken under a [`FileLocker`] lock named
/// after the path, so handles in different processes never overwrite each other's keys. The
/// file itself is replaced through a temporary sibling and an atomic rename.
#[derive(Clone, Debug)]
pub struct FileCache {
	path: PathBuf,
	locker: Arc<FileLocker>,
	lock_name: String,
}
impl FileCache {
	/// Opens (or prepares) a store at the provided path.
	///
	/// Write locks are kept in the directory returned by [`lock::file::lock_dir_beside`].
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let locker = FileLocker::new(lock::file::lock_dir_beside(&path))
			.map_err(|e| StoreError::Backend { message: e.to_string() })?;
		let lock_name = format!("slashauth.lock.fileCache::{}", path.display());

		Ok(Self { path, locker: Arc::new(locker), lock_name })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		let bytes = match fs::read(path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", path.display()),
				}),
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(Snapshot::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, contents: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension(format!("{}.tmp", process::id()));

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	// A snapshot that no longer parses is replaced by the next write.
	fn load_for_write(&self) -> Result<Snapshot, StoreError> {
		match Self::load_snapshot(&self.path) {
			Err(StoreError::Serialization { message }) => {
				obs::warn_event(FlowKind::Cache, "file_snapshot", &message);

				Ok(Snapshot::new())
			},
			other => other,
		}
	}

	async fn mutate(&self, apply: impl FnOnce(&mut Snapshot) -> bool) -> Result<(), StoreError> {
		let guard = lock::acquire_with_retry(self.locker.clone(), self.lock_name.as_str(), WRITE_LOCK)
			.await
			.map_err(|e| StoreError::Backend {
				message: format!("Failed to lock {}: {e}", self.path.display()),
			})?;
		let result = self.load_for_write().and_then(|mut snapshot| {
			if apply(&mut snapshot) { self.persist(&snapshot) } else { Ok(()) }
		});

		if let Err(e) = guard.release().await {
			obs::warn_event(FlowKind::Cache, "file_snapshot", &format!("Failed to unlock: {e}"));
		}

		result
	}
}
impl CacheStore for FileCache {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(Self::load_snapshot(&self.path)?.remove(key)) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|snapshot| {
				snapshot.insert(key.to_owned(), value);

				true
			})
			.await
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.mutate(|snapshot| snapshot.remove(key).is_some()).await })
	}

	fn as_enumerable(&self) -> Option<&dyn EnumerableStore> {
		Some(self)
	}
}
impl EnumerableStore for FileCache {
	fn all_keys(&self) -> StoreFuture<'_, Vec<String>> {
		Box::pin(async move { Ok(Self::load_snapshot(&self.path)?.into_keys().collect()) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::env;
	// self
	use super::*;

	fn temp_path(tag: &str) -> PathBuf {
		let unique = format!(
			"slashauth_file_cache_{tag}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn two_handles_on_one_path_see_each_other() {
		let path = temp_path("shared");
		let first = FileCache::open(&path).expect("Failed to open first handle.");
		let second = FileCache::open(&path).expect("Failed to open second handle.");

		first.set("k", "v1".into()).await.expect("First write should succeed.");

		assert_eq!(second.get("k").await.expect("Read should succeed."), Some("v1".into()));

		second.set("k", "v2".into()).await.expect("Second write should succeed.");

		assert_eq!(first.get("k").await.expect("Read should succeed."), Some("v2".into()));
		assert_eq!(first.all_keys().await.expect("Enumeration should succeed."), vec!["k"]);

		first.remove("k").await.expect("Remove should succeed.");

		assert!(second.get("k").await.expect("Read should succeed.").is_none());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary cache file {}: {e}", path.display())
		});
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_writers_on_one_path_keep_every_key() {
		let path = temp_path("writers");
		let writers = (0..4)
			.map(|writer| {
				let store = FileCache::open(&path).expect("Failed to open writer handle.");

				tokio::spawn(async move {
					for i in 0..10 {
						store
							.set(&format!("w{writer}-{i}"), "v".into())
							.await
							.expect("Write should succeed.");
					}
				})
			})
			.collect::<Vec<_>>();

		for writer in writers {
			writer.await.expect("Writer task should not panic.");
		}

		let store = FileCache::open(&path).expect("Failed to open reader handle.");

		assert_eq!(store.all_keys().await.expect("Enumeration should succeed.").len(), 40);

		store.remove("w0-0").await.expect("Remove should succeed.");

		assert_eq!(store.all_keys().await.expect("Enumeration should succeed.").len(), 39);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary cache file {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn corrupt_snapshot_fails_reads_and_is_replaced_by_writes() {
		let path = temp_path("corrupt");

		fs::write(&path, b"{not json").expect("Failed to seed corrupt snapshot.");

		let store = FileCache::open(&path).expect("Failed to open store.");

		assert!(matches!(store.get("k").await, Err(StoreError::Serialization { .. })));

		store.set("k", "v".into()).await.expect("Write should replace the corrupt snapshot.");

		assert_eq!(store.get("k").await.expect("Read should succeed."), Some("v".into()));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary cache file {}: {e}", path.display())
		});
	}
}
