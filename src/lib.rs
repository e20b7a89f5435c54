//! SlashAuth client core: scope-aware token caching, cross-process refresh locks and
//! single-flight token acquisition for OAuth/OIDC sessions.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod cookie;
pub mod error;
pub mod flows;
pub mod http;
pub mod lock;
pub mod obs;
pub mod verify;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and test doubles for integration tests; enabled via `cfg(test)` or
	//! the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// self
	use crate::{
		auth::{Account, DecodedToken, IdTokenClaims},
		cache::{CacheStore, MemoryCache},
		clock::ManualClock,
		config::ClientOptions,
		cookie::MemoryCookieStore,
		flows::SlashAuthClient,
		http::{EndpointFuture, TokenEndpoint, TokenEndpointResponse, TokenRequest},
		lock::{LockFuture, Locker, MemoryLocker},
		verify::{IdTokenVerifier, VerificationError, VerifyFuture, VerifyRequest},
	};

	/// Client identifier shared by the integration fixtures.
	pub const TEST_CLIENT_ID: &str = "client-test";

	/// Scripted [`TokenEndpoint`] that replays queued outcomes and counts calls.
	#[derive(Debug, Default)]
	pub struct ScriptedEndpoint {
		outcomes: Mutex<VecDeque<Result<TokenEndpointResponse>>>,
		requests: Mutex<Vec<TokenRequest>>,
		delay: Mutex<Option<std::time::Duration>>,
	}
	impl ScriptedEndpoint {
		/// Queues a successful response.
		pub fn push_ok(&self, response: TokenEndpointResponse) {
			self.outcomes.lock().push_back(Ok(response));
		}

		/// Queues a failure.
		pub fn push_err(&self, error: Error) {
			self.outcomes.lock().push_back(Err(error));
		}

		/// Makes every call sleep before answering so concurrent callers overlap.
		pub fn set_delay(&self, delay: std::time::Duration) {
			*self.delay.lock() = Some(delay);
		}

		/// Number of requests received so far.
		pub fn calls(&self) -> usize {
			self.requests.lock().len()
		}

		/// Snapshot of the received requests.
		pub fn requests(&self) -> Vec<TokenRequest> {
			self.requests.lock().clone()
		}
	}
	impl TokenEndpoint for ScriptedEndpoint {
		fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_> {
			Box::pin(async move {
				self.requests.lock().push(request);

				let delay = *self.delay.lock();

				if let Some(delay) = delay {
					tokio::time::sleep(delay).await;
				}

				self.outcomes.lock().pop_front().unwrap_or_else(|| {
					Err(TransientError::TokenEndpoint {
						message: "No scripted response left.".into(),
						status: Some(500),
						retry_after: None,
					}
					.into())
				})
			})
		}
	}

	/// Verifier double that accepts every token and projects a fixed subject.
	#[derive(Debug, Default)]
	pub struct StaticVerifier {
		reject: Mutex<Option<String>>,
		calls: AtomicUsize,
	}
	impl StaticVerifier {
		/// Makes subsequent verifications fail with the provided reason.
		pub fn reject_with(&self, reason: impl Into<String>) {
			*self.reject.lock() = Some(reason.into());
		}

		/// Number of verification calls observed.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl IdTokenVerifier for StaticVerifier {
		fn verify(&self, request: VerifyRequest) -> VerifyFuture<'_> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				if let Some(reason) = self.reject.lock().clone() {
					return Err(VerificationError::Rejected { reason });
				}

				let claims = IdTokenClaims {
					iss: Some(request.issuer.clone()),
					sub: Some(format!("sub-{}", request.id_token)),
					nonce: request.nonce.clone(),
					..Default::default()
				};
				let user = Account {
					sub: format!("sub-{}", request.id_token),
					client_id: TEST_CLIENT_ID.into(),
					..Default::default()
				};

				Ok(DecodedToken { claims, user })
			})
		}
	}

	/// Locker double that counts attempts and can simulate a lock held elsewhere.
	#[derive(Debug, Default)]
	pub struct CountingLocker {
		inner: MemoryLocker,
		held_elsewhere: std::sync::atomic::AtomicBool,
		acquisitions: AtomicUsize,
		releases: AtomicUsize,
	}
	impl CountingLocker {
		/// Forces every acquisition attempt to fail.
		pub fn hold_elsewhere(&self, held: bool) {
			self.held_elsewhere.store(held, Ordering::SeqCst);
		}

		/// Number of acquisition attempts.
		pub fn acquisitions(&self) -> usize {
			self.acquisitions.load(Ordering::SeqCst)
		}

		/// Number of releases.
		pub fn releases(&self) -> usize {
			self.releases.load(Ordering::SeqCst)
		}
	}
	impl Locker for CountingLocker {
		fn acquire<'a>(&'a self, name: &'a str, ttl: Duration) -> LockFuture<'a, bool> {
			Box::pin(async move {
				self.acquisitions.fetch_add(1, Ordering::SeqCst);

				if self.held_elsewhere.load(Ordering::SeqCst) {
					return Ok(false);
				}

				self.inner.acquire(name, ttl).await
			})
		}

		fn release<'a>(&'a self, name: &'a str) -> LockFuture<'a, ()> {
			Box::pin(async move {
				self.releases.fetch_add(1, Ordering::SeqCst);

				self.inner.release(name).await
			})
		}
	}

	/// Handles to every collaborator wired into a test client.
	#[derive(Clone, Debug)]
	pub struct TestRig {
		/// Cache backend shared with the client.
		pub store: Arc<MemoryCache>,
		/// Scripted token endpoint.
		pub endpoint: Arc<ScriptedEndpoint>,
		/// Verifier double.
		pub verifier: Arc<StaticVerifier>,
		/// Counting locker.
		pub locker: Arc<CountingLocker>,
		/// Cookie jar.
		pub cookies: Arc<MemoryCookieStore>,
		/// Manually driven clock.
		pub clock: Arc<ManualClock>,
	}

	/// Builds a client wired to in-memory doubles with zero lock backoff.
	pub fn build_test_client() -> (SlashAuthClient, TestRig) {
		let options = ClientOptions::builder("https://auth.example.com", TEST_CLIENT_ID)
			.lock_backoff(Duration::ZERO)
			.build()
			.expect("Test client options should be valid.");

		build_test_client_with(options)
	}

	/// Builds a client for the provided options wired to in-memory doubles.
	pub fn build_test_client_with(options: ClientOptions) -> (SlashAuthClient, TestRig) {
		let rig = TestRig {
			store: Arc::new(MemoryCache::default()),
			endpoint: Arc::new(ScriptedEndpoint::default()),
			verifier: Arc::new(StaticVerifier::default()),
			locker: Arc::new(CountingLocker::default()),
			cookies: Arc::new(MemoryCookieStore::default()),
			clock: Arc::new(ManualClock::new(time::macros::datetime!(2025-01-01 00:00 UTC))),
		};
		let client = build_peer_client(options, &rig);

		(client, rig)
	}

	/// Builds one more client over the collaborators of `rig`.
	///
	/// The new client shares the cache, lock, cookies and endpoint but keeps its own in-flight
	/// map, like a second tab or process would.
	pub fn build_peer_client(options: ClientOptions, rig: &TestRig) -> SlashAuthClient {
		let store: Arc<dyn CacheStore> = rig.store.clone();

		SlashAuthClient::with_token_endpoint(options, store, rig.endpoint.clone(), rig.verifier.clone())
			.with_locker(rig.locker.clone())
			.with_cookie_store(rig.cookies.clone())
			.with_clock(rig.clock.clone())
	}

	/// Token endpoint payload fixture with a refresh token and ID token.
	pub fn token_response(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenEndpointResponse {
		TokenEndpointResponse {
			access_token: access.into(),
			refresh_token: refresh.map(Into::into),
			id_token: Some(format!("id-{access}")),
			expires_in,
			scope: None,
			client_id: Some(TEST_CLIENT_ID.into()),
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{ConfigError, Error, Result, TransientError, TransportError};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
