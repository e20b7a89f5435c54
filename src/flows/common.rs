//! Request options and result shapes shared by the facade operations.

// self
use crate::{
	_prelude::*,
	auth::{CacheEntry, TokenSecret},
};

/// Options accepted by [`get_tokens`](crate::flows::SlashAuthClient::get_tokens).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetTokensOptions {
	/// Audience to request; defaults to the client's audience, then `default`.
	pub audience: Option<String>,
	/// Scope added on top of the default and instance scopes.
	pub scope: Option<String>,
	/// Skips both cache reads and always calls the token endpoint.
	pub ignore_cache: bool,
	/// Returns [`TokenResult::Detailed`] and surfaces every error.
	pub detailed_response: bool,
}
impl GetTokensOptions {
	/// Options requesting a detailed response.
	pub fn detailed() -> Self {
		Self { detailed_response: true, ..Default::default() }
	}

	/// Sets the audience.
	pub fn audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = Some(audience.into());

		self
	}

	/// Sets the extra scope.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Bypasses the cache.
	pub fn ignore_cache(mut self) -> Self {
		self.ignore_cache = true;

		self
	}
}

/// Audience and scope addressing a cached session, for the account accessors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountOptions {
	/// Audience of the cached tokens; defaults like [`GetTokensOptions::audience`].
	pub audience: Option<String>,
	/// Scope added on top of the default and instance scopes.
	pub scope: Option<String>,
}

/// Value returned by a successful `get_tokens` call.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenResult {
	/// Only the access token.
	AccessToken(TokenSecret),
	/// Token endpoint style payload without the refresh token.
	Detailed(DetailedTokenResponse),
}
impl TokenResult {
	/// Access token carried by either shape.
	pub fn access_token(&self) -> &TokenSecret {
		match self {
			Self::AccessToken(token) => token,
			Self::Detailed(detailed) => &detailed.access_token,
		}
	}

	pub(crate) fn from_entry(entry: CacheEntry, detailed: bool) -> Self {
		if !detailed {
			return Self::AccessToken(entry.access_token);
		}

		Self::Detailed(DetailedTokenResponse {
			id_token: entry.id_token,
			access_token: entry.access_token,
			expires_in: entry.expires_in,
			scope: entry.oauth_token_scope,
		})
	}
}
impl Debug for TokenResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::AccessToken(token) => f.debug_tuple("AccessToken").field(token).finish(),
			Self::Detailed(detailed) => f.debug_tuple("Detailed").field(detailed).finish(),
		}
	}
}

/// Detailed token payload; never carries the refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedTokenResponse {
	/// Raw ID token, when one is cached.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
	/// Access token.
	pub access_token: TokenSecret,
	/// Lifetime in seconds as returned by the token endpoint.
	pub expires_in: i64,
	/// Scope echoed by the token endpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
}
impl Debug for DetailedTokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DetailedTokenResponse")
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("access_token", &self.access_token)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Options accepted by [`logout`](crate::flows::SlashAuthClient::logout).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogoutOptions {
	/// Only clears local state; no logout URL is produced.
	pub local_only: bool,
	/// Extra query parameters for the logout URL.
	pub url: LogoutUrlOptions,
}

/// Query parameters of the server logout URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogoutUrlOptions {
	/// Whether `client_id` is sent; enabled by default.
	pub include_client_id: bool,
	/// Where the server redirects after logging out.
	pub return_to: Option<Url>,
	/// Device identifier forwarded to the server.
	pub device_id: Option<String>,
}
impl Default for LogoutUrlOptions {
	fn default() -> Self {
		Self { include_client_id: true, return_to: None, device_id: None }
	}
}
