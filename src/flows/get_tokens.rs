//! Token acquisition entry points: `get_tokens`, its convenience wrappers and `check_session`.

// self
use crate::{
	_prelude::*,
	auth::{CacheEntry, TokenSecret},
	cache::CacheKey,
	flows::{DetailedTokenResponse, GetTokensOptions, SlashAuthClient, TokenResult},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl SlashAuthClient {
	/// Returns tokens for the requested audience and scope, refreshing them when needed.
	///
	/// Concurrent calls for the same cache key share one acquisition. A fresh cache entry is
	/// returned without taking the refresh lock. Every success renews the authenticated marker.
	///
	/// Without `detailed_response`, every failure except [`Error::Timeout`] resolves to
	/// `Ok(None)`; with it, every failure is returned.
	pub async fn get_tokens(&self, options: GetTokensOptions) -> Result<Option<TokenResult>> {
		const KIND: FlowKind = FlowKind::GetTokens;

		let key = self.request_key(options.audience.as_deref(), options.scope.as_deref());
		let span = FlowSpan::for_key(KIND, "get_tokens", &key);
		let ignore_cache = options.ignore_cache;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let acquired = span
			.instrument(self.flights.run(key.clone(), || self.acquire(&key, ignore_cache)))
			.await;

		match acquired {
			Ok(entry) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				self.mark_authenticated();

				Ok(Some(TokenResult::from_entry(entry, options.detailed_response)))
			},
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				if options.detailed_response || matches!(e, Error::Timeout) {
					return Err(e);
				}

				obs::debug_event(KIND, "get_tokens", &format!("No tokens available: {e}"));

				Ok(None)
			},
		}
	}

	/// Access token for the default audience and scope, if one can be obtained.
	pub async fn get_access_token(&self) -> Result<Option<TokenSecret>> {
		Ok(self.get_tokens(GetTokensOptions::default()).await?.map(|result| match result {
			TokenResult::AccessToken(token) => token,
			TokenResult::Detailed(detailed) => detailed.access_token,
		}))
	}

	/// Detailed tokens for `options`; every failure is returned.
	pub async fn get_detailed_tokens(
		&self,
		options: GetTokensOptions,
	) -> Result<DetailedTokenResponse> {
		let options = GetTokensOptions { detailed_response: true, ..options };

		match self.get_tokens(options).await? {
			Some(TokenResult::Detailed(detailed)) => Ok(detailed),
			_ => Err(Error::NotLoggedIn),
		}
	}

	/// Silently restores a previous session.
	///
	/// Returns `false` without any network call when no authenticated marker cookie exists. A
	/// marker left under the legacy name is migrated first. Errors never escape.
	pub async fn check_session(&self, options: GetTokensOptions) -> bool {
		if !self.session_cookies.detect_session(self.cookies.as_ref(), &self.options.cookie_options())
		{
			obs::debug_event(FlowKind::GetTokens, "check_session", "No session marker found.");

			return false;
		}

		matches!(self.get_tokens(options).await, Ok(Some(_)))
	}

	async fn acquire(&self, key: &CacheKey, ignore_cache: bool) -> Result<CacheEntry> {
		if !ignore_cache {
			let cached = self.cache.get(key, self.options.expiry_margin).await?;

			if let Some(entry) = cached {
				return Ok(entry);
			}
		}

		self.refresh_entry(key, ignore_cache).await
	}
}
