//! Client facade and the flows it orchestrates.

pub mod common;
pub mod get_tokens;
pub mod login;
pub mod refresh;
pub mod session;
pub mod single_flight;

pub use common::*;
pub use login::*;
pub use refresh::*;
pub use single_flight::SingleFlight;

// self
#[cfg(feature = "reqwest")]
use crate::{
	cache::{FileCache, MemoryCache},
	config::CacheLocation,
	http::ReqwestTokenEndpoint,
	lock::{self, FileLocker},
};
use crate::{
	_prelude::*,
	auth::{CacheEntry, ScopeSet, DEFAULT_SCOPE},
	cache::{CacheKey, CacheManager, CacheStore},
	clock::{Clock, SystemClock},
	config::ClientOptions,
	cookie::{CookieStore, MemoryCookieStore, SessionCookies},
	http::TokenEndpoint,
	lock::{Locker, MemoryLocker},
	verify::IdTokenVerifier,
};

/// Token acquisition client for one SlashAuth application.
///
/// Cloning is cheap; clones share the cache, the in-flight request map, the refresh counters and
/// the continued-interaction slot.
#[derive(Clone)]
pub struct SlashAuthClient {
	options: Arc<ClientOptions>,
	store: Arc<dyn CacheStore>,
	cache: Arc<CacheManager>,
	endpoint: Arc<dyn TokenEndpoint>,
	verifier: Arc<dyn IdTokenVerifier>,
	locker: Arc<dyn Locker>,
	cookies: Arc<dyn CookieStore>,
	session_cookies: SessionCookies,
	clock: Arc<dyn Clock>,
	flights: Arc<SingleFlight<CacheKey, CacheEntry>>,
	continued: Arc<Mutex<Option<ContinuedInteraction>>>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl SlashAuthClient {
	/// Creates a client that sends token requests through `endpoint`.
	///
	/// The lock, cookie jar and clock default to in-process implementations; replace them with
	/// [`with_locker`](Self::with_locker), [`with_cookie_store`](Self::with_cookie_store) and
	/// [`with_clock`](Self::with_clock).
	pub fn with_token_endpoint(
		options: ClientOptions,
		store: Arc<dyn CacheStore>,
		endpoint: Arc<dyn TokenEndpoint>,
		verifier: Arc<dyn IdTokenVerifier>,
	) -> Self {
		let clock: Arc<dyn Clock> = Arc::new(SystemClock);
		let cache =
			Arc::new(CacheManager::new(options.client_id.as_str(), store.clone(), clock.clone()));
		let session_cookies = SessionCookies::new(options.client_id.as_str());

		Self {
			options: Arc::new(options),
			store,
			cache,
			endpoint,
			verifier,
			locker: Arc::new(MemoryLocker::default()),
			cookies: Arc::new(MemoryCookieStore::default()),
			session_cookies,
			clock,
			flights: Default::default(),
			continued: Default::default(),
			refresh_metrics: Default::default(),
		}
	}

	/// Replaces the refresh lock implementation.
	pub fn with_locker(mut self, locker: Arc<dyn Locker>) -> Self {
		self.locker = locker;

		self
	}

	/// Replaces the cookie jar holding the session markers.
	pub fn with_cookie_store(mut self, cookies: Arc<dyn CookieStore>) -> Self {
		self.cookies = cookies;

		self
	}

	/// Replaces the clock used for cache stamping, freshness checks and verification.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.cache =
			Arc::new(CacheManager::new(self.options.client_id.as_str(), self.store.clone(), clock.clone()));
		self.clock = clock;

		self
	}

	/// Validated options the client was built from.
	pub fn options(&self) -> &ClientOptions {
		&self.options
	}

	/// Cache manager backing the client.
	pub fn cache(&self) -> &CacheManager {
		&self.cache
	}

	/// Names of the session cookies owned by the client.
	pub fn session_cookies(&self) -> &SessionCookies {
		&self.session_cookies
	}

	fn cookie_jar(&self) -> &dyn CookieStore {
		self.cookies.as_ref()
	}

	/// Scope requested by every call: the default scope, the instance scope, then `extra`.
	pub(crate) fn request_scope(&self, extra: Option<&str>) -> ScopeSet {
		ScopeSet::merged([Some(DEFAULT_SCOPE), self.options.scope.as_deref(), extra])
	}

	/// Cache key addressed by a call naming `audience` and `scope`.
	pub(crate) fn request_key(&self, audience: Option<&str>, scope: Option<&str>) -> CacheKey {
		CacheKey::new(
			self.options.client_id.as_str(),
			audience.unwrap_or_else(|| self.options.default_audience()),
			self.request_scope(scope),
		)
	}

	/// Sets the authenticated marker cookie with the configured lifetime and domain.
	pub(crate) fn mark_authenticated(&self) {
		self.session_cookies.mark_authenticated(self.cookie_jar(), &self.options.cookie_options());
	}
}
#[cfg(feature = "reqwest")]
impl SlashAuthClient {
	/// Creates a client with the reqwest token endpoint and the configured cache backend.
	///
	/// A file-backed cache also gets a [`FileLocker`] next to the snapshot so processes sharing
	/// the cache serialize their refreshes.
	pub fn new(options: ClientOptions, verifier: Arc<dyn IdTokenVerifier>) -> Result<Self> {
		let endpoint = Arc::new(ReqwestTokenEndpoint::new(&options)?);

		match options.cache_location.clone() {
			CacheLocation::Memory => {
				let store = Arc::new(MemoryCache::default());

				Ok(Self::with_token_endpoint(options, store, endpoint, verifier))
			},
			CacheLocation::File { path } => {
				let store = Arc::new(FileCache::open(path.clone())?);
				let locker = Arc::new(FileLocker::new(lock::file::lock_dir_beside(&path))?);

				Ok(Self::with_token_endpoint(options, store, endpoint, verifier).with_locker(locker))
			},
		}
	}
}
impl Debug for SlashAuthClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SlashAuthClient")
			.field("client_id", &self.options.client_id)
			.field("domain", &self.options.domain.as_str())
			.field("cache", &self.cache)
			.finish_non_exhaustive()
	}
}
