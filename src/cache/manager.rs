//! Cache manager: fuzzy lookup, freshness checks, and bookkeeping over a [`CacheStore`].

// std
use std::cmp::Ordering;
// self
use crate::{
	_prelude::*,
	auth::{CacheEntry, TokenSecret},
	cache::{CacheKey, CacheStore, KeyIndex, StoreError},
	clock::Clock,
	obs::{self, FlowKind, PruneReason},
};

/// Reads and writes [`CacheEntry`] values for one client.
///
/// Lookups accept any stored entry whose scopes cover the requested ones. Lookups never write:
/// unreadable or dead entries are skipped and left for [`prune`](Self::prune), which callers run
/// while holding the refresh lock.
pub struct CacheManager {
	client_id: String,
	store: Arc<dyn CacheStore>,
	index: KeyIndex,
	clock: Arc<dyn Clock>,
}
impl CacheManager {
	/// Creates a manager; the key enumeration strategy is picked from the store's capabilities.
	pub fn new(client_id: impl Into<String>, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
		let client_id = client_id.into();
		let index = KeyIndex::for_store(store.as_ref(), &client_id);

		Self { client_id, store, index, clock }
	}

	/// Client whose entries this manager owns.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// Backing store.
	pub fn store(&self) -> &Arc<dyn CacheStore> {
		&self.store
	}

	/// Returns `true` when keys are tracked through a manifest.
	pub fn uses_manifest(&self) -> bool {
		self.index.uses_manifest()
	}

	/// Returns the best matching entry if it stays valid beyond `expiry_margin`.
	pub async fn get(
		&self,
		key: &CacheKey,
		expiry_margin: Duration,
	) -> Result<Option<CacheEntry>, StoreError> {
		let now = self.clock.now();

		Ok(self.best_match(key).await?.map(|candidate| candidate.entry).filter(|entry| {
			entry.is_fresh_at(now, expiry_margin)
		}))
	}

	/// Returns the best matching entry regardless of freshness.
	pub async fn get_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
		Ok(self.best_match(key).await?.map(|candidate| candidate.entry))
	}

	/// Returns the refresh token of the best matching entry regardless of freshness.
	pub async fn get_refresh_token(&self, key: &CacheKey) -> Result<Option<TokenSecret>, StoreError> {
		Ok(self.get_entry(key).await?.and_then(|entry| entry.refresh_token))
	}

	/// Stamps the entry with the current instant and writes it under its canonical key.
	pub async fn set(&self, mut entry: CacheEntry) -> Result<CacheEntry, StoreError> {
		entry.stamp(self.clock.now());

		let storage_key = entry.key().storage_key();
		let raw = serde_json::to_string(&entry).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize cache entry: {e}"),
		})?;

		self.store.set(&storage_key, raw).await?;
		self.index.track(self.store.as_ref(), &storage_key).await?;

		Ok(entry)
	}

	/// Removes the entry stored under exactly `key`.
	pub async fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
		self.remove_raw(&key.storage_key()).await
	}

	/// Removes every entry of this client and resets the key index. Idempotent.
	pub async fn clear(&self) -> Result<(), StoreError> {
		for raw in self.index.keys(self.store.as_ref()).await? {
			self.store.remove(&raw).await?;
		}

		self.index.reset(self.store.as_ref()).await
	}

	/// Best-effort [`clear`](Self::clear) that never fails; individual failures are logged.
	pub async fn clear_sync(&self) {
		let keys = match self.index.keys(self.store.as_ref()).await {
			Ok(keys) => keys,
			Err(e) => {
				obs::warn_event(FlowKind::Cache, "clear", &format!("Key enumeration failed: {e}"));

				Vec::new()
			},
		};

		for raw in keys {
			if let Err(e) = self.store.remove(&raw).await {
				obs::warn_event(FlowKind::Cache, "clear", &format!("Failed to remove entry: {e}"));
			}
		}
		if let Err(e) = self.index.reset(self.store.as_ref()).await {
			obs::warn_event(FlowKind::Cache, "clear", &format!("Failed to reset key index: {e}"));
		}
	}

	/// Deletes entries matching `key` that can never be served again and returns how many went.
	///
	/// That covers values that no longer deserialize, manifest records without a value, and
	/// expired entries without a refresh token. Expired entries holding a refresh token are kept
	/// for the refresh grant.
	pub async fn prune(&self, key: &CacheKey) -> Result<usize, StoreError> {
		let now = self.clock.now();
		let mut pruned = 0;

		for (raw, _) in self.matching_keys(key).await? {
			let Some(value) = self.store.get(&raw).await? else {
				self.index.untrack(self.store.as_ref(), &raw).await?;

				continue;
			};
			let reason = match serde_json::from_str::<CacheEntry>(&value) {
				Err(_) => PruneReason::Corrupt,
				Ok(entry) if entry.is_expired_at(now) && entry.refresh_token.is_none() =>
					PruneReason::Expired,
				Ok(_) => continue,
			};

			obs::debug_event(FlowKind::Cache, "prune", &format!("Removing {} entry.", reason.as_str()));
			obs::record_cache_prune(reason);
			self.remove_raw(&raw).await?;

			pruned += 1;
		}

		Ok(pruned)
	}

	async fn remove_raw(&self, raw: &str) -> Result<(), StoreError> {
		self.store.remove(raw).await?;
		self.index.untrack(self.store.as_ref(), raw).await
	}

	async fn matching_keys(
		&self,
		requested: &CacheKey,
	) -> Result<Vec<(String, CacheKey)>, StoreError> {
		Ok(self
			.index
			.keys(self.store.as_ref())
			.await?
			.into_iter()
			.filter_map(|raw| CacheKey::from_storage_key(&raw).map(|key| (raw, key)))
			.filter(|(_, candidate)| requested.matches(candidate))
			.collect())
	}

	async fn best_match(&self, requested: &CacheKey) -> Result<Option<Candidate>, StoreError> {
		let mut found = Vec::new();

		for (raw, key) in self.matching_keys(requested).await? {
			// Listed by the manifest but gone from the store.
			let Some(value) = self.store.get(&raw).await? else {
				continue;
			};

			match serde_json::from_str::<CacheEntry>(&value) {
				Ok(entry) => found.push(Candidate { raw, key, entry }),
				Err(e) => obs::warn_event(
					FlowKind::Cache,
					"corrupt_entry",
					&format!("Skipping unreadable cache entry: {e}"),
				),
			}
		}

		Ok(found.into_iter().min_by(|lhs, rhs| rank(requested, lhs, rhs)))
	}
}
impl Debug for CacheManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheManager")
			.field("client_id", &self.client_id)
			.field("index", &self.index)
			.finish_non_exhaustive()
	}
}

struct Candidate {
	raw: String,
	key: CacheKey,
	entry: CacheEntry,
}

// Exact scope first, then the narrowest superset, then the newest write, then the key itself.
fn rank(requested: &CacheKey, lhs: &Candidate, rhs: &Candidate) -> Ordering {
	(lhs.key.scope != requested.scope)
		.cmp(&(rhs.key.scope != requested.scope))
		.then_with(|| lhs.key.scope.len().cmp(&rhs.key.scope.len()))
		.then_with(|| rhs.entry.written_at.cmp(&lhs.entry.written_at))
		.then_with(|| lhs.raw.cmp(&rhs.raw))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{auth::ScopeSet, cache::MemoryCache, clock::ManualClock};

	fn manager() -> (CacheManager, Arc<MemoryCache>, Arc<ManualClock>) {
		let store = Arc::new(MemoryCache::default());
		let clock = Arc::new(ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC)));
		let manager = CacheManager::new("client", store.clone(), clock.clone());

		(manager, store, clock)
	}

	fn entry(scope: &str, access: &str, refresh: Option<&str>, expires_in: i64) -> CacheEntry {
		CacheEntry::builder("client", "api", ScopeSet::from_delimited(scope))
			.access_token(access)
			.maybe_refresh_token(refresh.map(TokenSecret::new))
			.expires_in(expires_in)
			.build()
			.expect("Entry fixture should build.")
	}

	fn key(scope: &str) -> CacheKey {
		CacheKey::new("client", "api", ScopeSet::from_delimited(scope))
	}

	async fn pick(manager: &CacheManager, scope: &str) -> Option<String> {
		manager
			.get(&key(scope), Duration::ZERO)
			.await
			.expect("Lookup should succeed.")
			.map(|entry| entry.access_token.into_exposed())
	}

	#[tokio::test]
	async fn set_stamps_with_the_injected_clock() {
		let (manager, _, clock) = manager();
		let stored = manager.set(entry("openid", "a", None, 100)).await.expect("Set should succeed.");

		assert_eq!(stored.written_at, clock.now());
		assert_eq!(stored.expires_at, clock.now() + Duration::seconds(100));
	}

	#[tokio::test]
	async fn exact_scope_wins_over_superset() {
		let (manager, _, clock) = manager();

		manager.set(entry("openid email profile", "wide", None, 100)).await.expect("Set wide.");
		clock.advance(Duration::seconds(1));
		manager.set(entry("openid email", "narrow", None, 100)).await.expect("Set narrow.");
		clock.advance(Duration::seconds(1));
		manager.set(entry("openid", "exact", None, 100)).await.expect("Set exact.");

		assert_eq!(pick(&manager, "openid").await.as_deref(), Some("exact"));
		assert_eq!(pick(&manager, "email").await.as_deref(), Some("narrow"));
		assert_eq!(pick(&manager, "profile").await.as_deref(), Some("wide"));
		assert_eq!(pick(&manager, "admin").await, None);
	}

	#[tokio::test]
	async fn expired_entries_are_pruned_unless_refreshable() {
		let (manager, store, clock) = manager();

		manager.set(entry("openid", "a", None, 10)).await.expect("Set should succeed.");
		manager.set(entry("email", "b", Some("r"), 10)).await.expect("Set should succeed.");
		clock.advance(Duration::seconds(11));

		assert!(manager.get(&key("openid"), Duration::ZERO).await.expect("Lookup.").is_none());
		assert!(manager.get(&key("email"), Duration::ZERO).await.expect("Lookup.").is_none());
		assert!(store.raw(&key("openid").storage_key()).is_some(), "Lookups never write.");
		assert_eq!(manager.prune(&key("openid")).await.expect("Prune should succeed."), 1);
		assert_eq!(manager.prune(&key("email")).await.expect("Prune should succeed."), 0);
		assert!(store.raw(&key("openid").storage_key()).is_none());
		assert!(store.raw(&key("email").storage_key()).is_some());
		assert_eq!(
			manager
				.get_refresh_token(&key("email"))
				.await
				.expect("Lookup should succeed.")
				.map(TokenSecret::into_exposed)
				.as_deref(),
			Some("r")
		);
	}

	#[tokio::test]
	async fn clear_is_scoped_to_the_client_and_idempotent() {
		let (manager, store, _) = manager();

		store.insert_raw(CacheKey::new("other", "api", ScopeSet::default()).storage_key(), "{}");
		manager.set(entry("openid", "a", None, 10)).await.expect("Set should succeed.");
		manager.clear().await.expect("First clear should succeed.");
		manager.clear().await.expect("Second clear should succeed.");
		manager.clear_sync().await;

		assert_eq!(store.len(), 1);
	}
}
