//! Key enumeration strategies for cache stores.
//!
//! Stores that can list their keys are enumerated directly. Every other store gets a manifest
//! document written next to the entries, kept in step with each write and removal.

// std
use std::collections::BTreeSet;
// crates.io
use async_lock::Mutex as AsyncMutex;
// self
use crate::{
	_prelude::*,
	cache::{
		CacheStore, StoreError,
		key::{self, CacheKey},
	},
	obs::{self, FlowKind},
};

/// Enumeration strategy, fixed when the cache manager is constructed.
#[derive(Debug)]
pub enum KeyIndex {
	/// The store lists its own keys.
	Native(NativeIndex),
	/// Keys are tracked in a manifest stored inside the store.
	Manifest(KeyManifest),
}
impl KeyIndex {
	/// Picks native enumeration when `store` supports it and a manifest otherwise.
	pub fn for_store(store: &dyn CacheStore, client_id: &str) -> Self {
		if store.as_enumerable().is_some() {
			Self::Native(NativeIndex::new(client_id))
		} else {
			Self::Manifest(KeyManifest::new(client_id))
		}
	}

	/// Returns `true` when a manifest is in use.
	pub fn uses_manifest(&self) -> bool {
		matches!(self, Self::Manifest(_))
	}

	/// Storage keys of every cache entry known for this client.
	pub async fn keys(&self, store: &dyn CacheStore) -> Result<Vec<String>, StoreError> {
		match self {
			Self::Native(index) => index.keys(store).await,
			Self::Manifest(manifest) => manifest.keys(store).await,
		}
	}

	/// Records a newly written key.
	pub async fn track(&self, store: &dyn CacheStore, key: &str) -> Result<(), StoreError> {
		match self {
			Self::Native(_) => Ok(()),
			Self::Manifest(manifest) => manifest.track(store, key).await,
		}
	}

	/// Forgets a removed key.
	pub async fn untrack(&self, store: &dyn CacheStore, key: &str) -> Result<(), StoreError> {
		match self {
			Self::Native(_) => Ok(()),
			Self::Manifest(manifest) => manifest.untrack(store, key).await,
		}
	}

	/// Drops all bookkeeping after a full clear.
	pub async fn reset(&self, store: &dyn CacheStore) -> Result<(), StoreError> {
		match self {
			Self::Native(_) => Ok(()),
			Self::Manifest(manifest) => manifest.reset(store).await,
		}
	}
}

/// Enumerates entries straight from an enumerable store.
#[derive(Debug)]
pub struct NativeIndex {
	client_id: String,
}
impl NativeIndex {
	fn new(client_id: &str) -> Self {
		Self { client_id: client_id.to_owned() }
	}

	async fn keys(&self, store: &dyn CacheStore) -> Result<Vec<String>, StoreError> {
		let Some(enumerable) = store.as_enumerable() else {
			return Err(StoreError::Backend {
				message: "Store stopped supporting key enumeration.".into(),
			});
		};
		let keys = enumerable.all_keys().await?;

		Ok(keys
			.into_iter()
			.filter(|raw| {
				CacheKey::from_storage_key(raw).is_some_and(|key| key.client_id == self.client_id)
			})
			.collect())
	}
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestDocument {
	keys: BTreeSet<String>,
}

/// Manifest of entry keys persisted under `@@slashauth@@::<client_id>`.
///
/// A manifest that no longer parses is recovered by deleting every entry of the client that can
/// still be reached, then starting over with an empty document. Reachable entries are those the
/// store can list and those whose keys are still legible in the damaged document.
#[derive(Debug)]
pub struct KeyManifest {
	client_id: String,
	manifest_key: String,
	// Serializes read-modify-write cycles within this process.
	write_lock: AsyncMutex<()>,
}
impl KeyManifest {
	/// Creates a manifest handle for `client_id`.
	pub fn new(client_id: &str) -> Self {
		Self {
			client_id: client_id.to_owned(),
			manifest_key: key::manifest_key(client_id),
			write_lock: AsyncMutex::new(()),
		}
	}

	/// Storage key holding the manifest document.
	pub fn manifest_key(&self) -> &str {
		&self.manifest_key
	}

	async fn keys(&self, store: &dyn CacheStore) -> Result<Vec<String>, StoreError> {
		Ok(self.load(store).await?.keys.into_iter().collect())
	}

	async fn track(&self, store: &dyn CacheStore, key: &str) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.load(store).await?;

		if document.keys.insert(key.to_owned()) {
			self.save(store, &document).await?;
		}

		Ok(())
	}

	async fn untrack(&self, store: &dyn CacheStore, key: &str) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.load(store).await?;

		if document.keys.remove(key) {
			self.save(store, &document).await?;
		}

		Ok(())
	}

	async fn reset(&self, store: &dyn CacheStore) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;

		store.remove(&self.manifest_key).await
	}

	async fn load(&self, store: &dyn CacheStore) -> Result<ManifestDocument, StoreError> {
		let Some(raw) = store.get(&self.manifest_key).await? else {
			return Ok(ManifestDocument::default());
		};

		match serde_json::from_str(&raw) {
			Ok(document) => Ok(document),
			Err(e) => {
				obs::warn_event(
					FlowKind::Cache,
					"manifest",
					&format!("Key manifest is unreadable; clearing the cache: {e}"),
				);
				self.recover(store, &raw).await?;

				Ok(ManifestDocument::default())
			},
		}
	}

	async fn recover(&self, store: &dyn CacheStore, damaged: &str) -> Result<(), StoreError> {
		let mut reachable = damaged.split('"').map(str::to_owned).collect::<BTreeSet<_>>();

		if let Some(enumerable) = store.as_enumerable() {
			reachable.extend(enumerable.all_keys().await?);
		}

		for raw in reachable {
			if CacheKey::from_storage_key(&raw).is_some_and(|key| key.client_id == self.client_id) {
				store.remove(&raw).await?;
			}
		}

		self.save(store, &ManifestDocument::default()).await
	}

	async fn save(
		&self,
		store: &dyn CacheStore,
		document: &ManifestDocument,
	) -> Result<(), StoreError> {
		let raw = serde_json::to_string(document).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize key manifest: {e}"),
		})?;

		store.set(&self.manifest_key, raw).await
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::ScopeSet,
		cache::{MemoryCache, StoreFuture},
	};

	#[derive(Default)]
	struct PlainStore(MemoryCache);
	impl CacheStore for PlainStore {
		fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
			self.0.get(key)
		}

		fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
			self.0.set(key, value)
		}

		fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
			self.0.remove(key)
		}
	}

	#[tokio::test]
	async fn strategy_follows_store_capability() {
		assert!(!KeyIndex::for_store(&MemoryCache::default(), "c").uses_manifest());
		assert!(KeyIndex::for_store(&PlainStore::default(), "c").uses_manifest());
	}

	#[tokio::test]
	async fn native_index_only_lists_entries_of_its_client() {
		let store = MemoryCache::default();
		let ours = CacheKey::new("c", "a", Default::default()).storage_key();
		let theirs = CacheKey::new("d", "a", Default::default()).storage_key();

		store.insert_raw(&ours, "{}");
		store.insert_raw(theirs, "{}");
		store.insert_raw("unrelated", "{}");
		store.insert_raw(key::manifest_key("c"), "{}");

		let index = KeyIndex::for_store(&store, "c");

		assert_eq!(index.keys(&store).await.expect("Enumeration should succeed."), vec![ours]);
	}

	#[tokio::test]
	async fn manifest_tracks_writes_and_recovers_from_corruption() {
		let store = PlainStore::default();
		let index = KeyIndex::for_store(&store, "c");

		index.track(&store, "k1").await.expect("Track should succeed.");
		index.track(&store, "k2").await.expect("Track should succeed.");
		index.track(&store, "k1").await.expect("Repeated track should be a no-op.");
		index.untrack(&store, "k2").await.expect("Untrack should succeed.");

		assert_eq!(index.keys(&store).await.expect("Keys should load."), vec!["k1"]);
		assert_eq!(store.0.raw(&key::manifest_key("c")).as_deref(), Some(r#"{"keys":["k1"]}"#));

		index.reset(&store).await.expect("Reset should succeed.");

		assert!(store.0.is_empty());
	}

	#[tokio::test]
	async fn corrupt_manifest_clears_every_entry_it_still_names() {
		let store = PlainStore::default();
		let index = KeyIndex::for_store(&store, "c");
		let first = CacheKey::new("c", "api", ScopeSet::from_delimited("openid")).storage_key();
		let second = CacheKey::new("c", "api", ScopeSet::from_delimited("email")).storage_key();
		let foreign = CacheKey::new("d", "api", ScopeSet::from_delimited("openid")).storage_key();

		for key in [&first, &second, &foreign] {
			store.0.insert_raw(key, "{}");
		}

		store.0.insert_raw("unrelated", "kept");
		store.0.insert_raw(
			key::manifest_key("c"),
			format!(r#"{{"keys":["{first}","{second}","{foreign}""#),
		);

		assert!(index.keys(&store).await.expect("Corrupt manifest should be recovered.").is_empty());
		assert!(store.0.raw(&first).is_none());
		assert!(store.0.raw(&second).is_none());
		assert!(store.0.raw(&foreign).is_some(), "Entries of other clients are left alone.");
		assert_eq!(store.0.raw("unrelated").as_deref(), Some("kept"));
		assert_eq!(store.0.raw(&key::manifest_key("c")).as_deref(), Some(r#"{"keys":[]}"#));
	}
}
