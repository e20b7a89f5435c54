//! Thread-safe in-memory [`CacheStore`] for single-process clients and tests.

// self
use crate::{
	_prelude::*,
	cache::{CacheStore, EnumerableStore, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Process-local store; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache(StoreMap);
impl MemoryCache {
	/// Number of stored keys, including bookkeeping keys.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Reads a raw value without going through the async contract.
	pub fn raw(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	/// Writes a raw value without going through the async contract.
	pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
		self.0.write().insert(key.into(), value.into());
	}

	fn keys_now(map: &StoreMap) -> Vec<String> {
		let mut keys = map.read().keys().cloned().collect::<Vec<_>>();

		keys.sort();

		keys
	}
}
impl CacheStore for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), value);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}

	fn as_enumerable(&self) -> Option<&dyn EnumerableStore> {
		Some(self)
	}
}
impl EnumerableStore for MemoryCache {
	fn all_keys(&self) -> StoreFuture<'_, Vec<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok::<_, StoreError>(Self::keys_now(&map)) })
	}
}
