//! Session accessors and logout.

// self
use crate::{
	_prelude::*,
	auth::{Account, CacheEntry, IdTokenClaims},
	flows::{AccountOptions, LogoutOptions, LogoutUrlOptions, SlashAuthClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl SlashAuthClient {
	/// Returns `true` when an unexpired cache entry carries an account.
	pub async fn is_authenticated(&self) -> bool {
		matches!(self.get_account(AccountOptions::default()).await, Ok(Some(_)))
	}

	/// Account projection of the cached ID token for `options`.
	pub async fn get_account(&self, options: AccountOptions) -> Result<Option<Account>> {
		Ok(self
			.cached_session(&options)
			.await?
			.and_then(|entry| entry.decoded_token)
			.map(|d| d.user))
	}

	/// Raw claims of the cached ID token for `options`.
	pub async fn get_id_token_claims(
		&self,
		options: AccountOptions,
	) -> Result<Option<IdTokenClaims>> {
		Ok(self
			.cached_session(&options)
			.await?
			.and_then(|entry| entry.decoded_token)
			.map(|d| d.claims))
	}

	/// Ends the session: clears every cached entry of the client and the session cookies.
	///
	/// Never fails. Unless `local_only` is set, the server logout URL is returned for the caller
	/// to visit.
	pub async fn logout(&self, options: LogoutOptions) -> Option<Url> {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		span.instrument(self.local_logout()).await;
		obs::record_flow_outcome(KIND, FlowOutcome::Success);

		if options.local_only {
			return None;
		}

		Some(self.build_logout_url(&options.url))
	}

	/// Server logout URL: `/auth/logout` with `logout=true` and the requested parameters.
	pub fn build_logout_url(&self, options: &LogoutUrlOptions) -> Url {
		let mut url = self.options.logout_endpoint.clone();

		{
			let mut pairs = url.query_pairs_mut();

			if options.include_client_id {
				pairs.append_pair("client_id", self.options.client_id.as_str());
			}
			if let Some(return_to) = &options.return_to {
				pairs.append_pair("returnTo", return_to.as_str());
			}
			if let Some(device_id) = &options.device_id {
				pairs.append_pair("device_id", device_id);
			}

			pairs.append_pair("logout", "true");
		}

		url
	}

	/// Clears the cache and the session cookies without contacting the server.
	pub(crate) async fn local_logout(&self) {
		self.cache.clear_sync().await;
		self.session_cookies.clear(self.cookies.as_ref());
		obs::debug_event(FlowKind::Logout, "local_logout", "Local session cleared.");
	}

	async fn cached_session(&self, options: &AccountOptions) -> Result<Option<CacheEntry>> {
		let key = self.request_key(options.audience.as_deref(), options.scope.as_deref());

		Ok(self.cache.get(&key, Duration::ZERO).await?)
	}
}
