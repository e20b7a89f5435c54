//! Key-value persistence contracts, storage-key layout, and the cache manager built on them.

pub mod file;
pub mod key;
pub mod manager;
pub mod manifest;
pub mod memory;

pub use file::FileCache;
pub use key::CacheKey;
pub use manager::CacheManager;
pub use manifest::{KeyIndex, KeyManifest, NativeIndex};
pub use memory::MemoryCache;

// self
use crate::_prelude::*;

/// Boxed future returned by cache stores.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// String key-value persistence used for serialized cache entries.
///
/// Implementations perform no locking of their own; the refresh lock serializes writers that
/// share a backend across processes.
pub trait CacheStore
where
	Self: Send + Sync,
{
	/// Reads the raw value stored under `key`.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores or replaces the raw value under `key`.
	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Deletes `key`; missing keys are not an error.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Exposes key enumeration when the backend supports it.
	///
	/// Stores returning `None` get a key manifest maintained inside the store instead.
	fn as_enumerable(&self) -> Option<&dyn EnumerableStore> {
		None
	}
}

/// Optional capability for stores that can list every key they hold.
pub trait EnumerableStore
where
	Self: Send + Sync,
{
	/// Lists every key currently stored.
	fn all_keys(&self) -> StoreFuture<'_, Vec<String>>;
}

/// Error type produced by [`CacheStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	struct BareStore;
	impl CacheStore for BareStore {
		fn get<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<String>> {
			Box::pin(async { Ok(None) })
		}

		fn set<'a>(&'a self, _: &'a str, _: String) -> StoreFuture<'a, ()> {
			Box::pin(async { Ok(()) })
		}

		fn remove<'a>(&'a self, _: &'a str) -> StoreFuture<'a, ()> {
			Box::pin(async { Ok(()) })
		}
	}

	#[test]
	fn enumeration_is_opt_in() {
		assert!(BareStore.as_enumerable().is_none());
		assert!(MemoryCache::default().as_enumerable().is_some());
	}

	#[test]
	fn store_errors_serialize_with_their_message() {
		let error = StoreError::Serialization { message: "bad json".into() };
		let json = serde_json::to_string(&error).expect("Store error should serialize.");

		assert!(json.contains("bad json"));
		assert_eq!(error.to_string(), "Serialization error: bad json.");
	}
}
