//! Refresh-token grant under the cross-process refresh lock.
//!
//! [`SlashAuthClient::refresh_entry`] walks the acquisition sequence for one cache key: take the
//! client's refresh lock, prune dead entries, look at the cache again (another holder may have
//! refreshed while this call waited), redeem the refresh token, verify the returned ID token,
//! write the new entry and set the authenticated marker. The lock is released on every exit path.
//!
//! A key with no refresh token of its own borrows the one cached under the base scope of its
//! audience; the new entry is still written under the requested key. A missing refresh token and
//! a 401/403 from the token endpoint both end the local session.

mod metrics;

pub use metrics::{RefreshMetrics, RefreshSnapshot};

// self
use crate::{
	_prelude::*,
	auth::{CacheEntry, DecodedToken, TokenSecret},
	cache::CacheKey,
	flows::SlashAuthClient,
	http::{TokenEndpointResponse, TokenRequest},
	lock::{self, LockGuard},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	verify::VerifyRequest,
};

impl SlashAuthClient {
	/// Runs the locked part of token acquisition for `key`.
	///
	/// With `ignore_cache` unset, a fresh entry found after the lock is taken is returned without
	/// contacting the token endpoint.
	pub async fn refresh_entry(&self, key: &CacheKey, ignore_cache: bool) -> Result<CacheEntry> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::for_key(KIND, "refresh_entry", key);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let guard = lock::acquire_with_retry(
					self.locker.clone(),
					lock::get_tokens_lock_name(self.options.client_id.as_str()),
					self.options.lock,
				)
				.await?;
				let result = self.refresh_locked(key, ignore_cache).await;

				release(guard).await;

				result
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn refresh_locked(&self, key: &CacheKey, ignore_cache: bool) -> Result<CacheEntry> {
		self.cache.prune(key).await?;

		if !ignore_cache {
			let cached = self.cache.get(key, self.options.expiry_margin).await?;

			if let Some(entry) = cached {
				obs::debug_event(FlowKind::Refresh, "recheck", "Entry was refreshed while waiting.");

				return Ok(entry);
			}
		}

		self.refresh_metrics.record_attempt();

		let outcome = self.redeem_refresh_token(key).await;

		self.refresh_metrics.record_outcome(&outcome);

		outcome
	}

	async fn redeem_refresh_token(&self, key: &CacheKey) -> Result<CacheEntry> {
		let previous = self.refresh_source(key).await?;
		let Some(refresh_token) = previous.as_ref().and_then(|entry| entry.refresh_token.clone())
		else {
			obs::debug_event(FlowKind::Refresh, "no_refresh_token", "No refresh token is cached.");
			self.local_logout().await;

			return Err(Error::NotLoggedIn);
		};
		let request = TokenRequest::RefreshToken {
			client_id: key.client_id.clone(),
			refresh_token: refresh_token.clone(),
			audience: key.audience.clone(),
			scope: key.scope.clone(),
			redirect_uri: self.options.redirect_uri.clone(),
		};
		let response = match self.endpoint.exchange(request).await {
			Ok(response) => response,
			Err(e) => {
				if e.is_unauthorized() {
					obs::warn_event(
						FlowKind::Refresh,
						"unauthorized",
						"Token endpoint rejected the session; logging out locally.",
					);
					self.local_logout().await;
				}

				return Err(e);
			},
		};

		response.validate()?;

		let decoded = match response.id_token.as_deref() {
			Some(id_token) => Some(self.verify_id_token(id_token, &key.audience, None, None).await?),
			None => None,
		};
		let entry = build_entry(key, response, decoded, previous, Some(refresh_token))?;
		let stored = self.cache.set(entry).await?;

		self.mark_authenticated();

		Ok(stored)
	}

	// The best match for `key` when it carries a refresh token. Otherwise the session entry stored
	// under the base scope of the same audience, whose refresh token covers every scope the
	// client may ask for.
	async fn refresh_source(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
		let requested = self.cache.get_entry(key).await?;

		if requested.as_ref().is_some_and(|entry| entry.refresh_token.is_some()) {
			return Ok(requested);
		}

		let base = self.request_key(Some(&key.audience), None);

		if base == *key {
			return Ok(requested);
		}

		let session = self.cache.get_entry(&base).await?;

		Ok(session.filter(|entry| entry.refresh_token.is_some()).or(requested))
	}

	/// Verifies `id_token` with the client's issuer, leeway and max age.
	pub(crate) async fn verify_id_token(
		&self,
		id_token: &str,
		audience: &str,
		nonce: Option<String>,
		organization_id: Option<String>,
	) -> Result<DecodedToken> {
		let request = VerifyRequest {
			issuer: self.options.issuer.clone(),
			audience: audience.to_owned(),
			id_token: id_token.to_owned(),
			nonce,
			organization_id,
			leeway: self.options.leeway,
			max_age: self.options.max_age,
			now: self.clock.now(),
		};

		Ok(self.verifier.verify(request).await?)
	}
}

/// Builds the cache entry for a token response.
///
/// A response without a refresh token keeps `fallback_refresh`; one without an ID token keeps
/// the ID token of `previous`.
pub(crate) fn build_entry(
	key: &CacheKey,
	response: TokenEndpointResponse,
	decoded: Option<DecodedToken>,
	previous: Option<CacheEntry>,
	fallback_refresh: Option<TokenSecret>,
) -> Result<CacheEntry> {
	let refresh_token = response.refresh_token.map(TokenSecret::new).or(fallback_refresh);
	let mut builder = CacheEntry::builder(&key.client_id, &key.audience, key.scope.clone())
		.access_token(response.access_token)
		.maybe_refresh_token(refresh_token)
		.expires_in(response.expires_in)
		.oauth_token_scope(response.scope);

	let id_token = match (response.id_token, decoded) {
		(Some(raw), Some(decoded)) => Some((raw, decoded)),
		_ => previous.and_then(|entry| entry.id_token.zip(entry.decoded_token)),
	};

	if let Some((raw, decoded)) = id_token {
		builder = builder.id_token(raw, decoded);
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

async fn release(guard: LockGuard) {
	if let Err(e) = guard.release().await {
		obs::warn_event(FlowKind::Lock, "release", &format!("Failed to release the lock: {e}"));
	}
}
