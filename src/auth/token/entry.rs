//! Cached token entries, their freshness rules, and the builder used by flows.

// self
use crate::{
	_prelude::*,
	auth::{
		ScopeSet,
		token::{claims::DecodedToken, secret::TokenSecret},
	},
	cache::CacheKey,
};

/// Freshness of a cache entry relative to an instant and an expiry margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
	/// The access token stays valid past the margin.
	Fresh,
	/// The access token is still valid but inside the margin.
	Expiring,
	/// The access token reached its expiry instant.
	Expired,
}

/// Errors produced by [`CacheEntryBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheEntryBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no lifetime was configured.
	#[error("The expires_in lifetime is required.")]
	MissingExpiresIn,
	/// Issued when the lifetime is zero or negative.
	#[error("The expires_in lifetime must be positive.")]
	NonPositiveExpiresIn,
}

/// Token material cached for one `(client_id, audience, scope)` triple.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
	/// Client the tokens were issued to.
	pub client_id: String,
	/// Audience the tokens were issued for.
	pub audience: String,
	/// Normalized scopes requested for the tokens.
	pub scope: ScopeSet,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if one was issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Raw ID token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
	/// Verified projection of the ID token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub decoded_token: Option<DecodedToken>,
	/// Lifetime in seconds as returned by the token endpoint.
	pub expires_in: i64,
	/// Absolute expiry computed when the entry was written.
	pub expires_at: OffsetDateTime,
	/// Instant the entry was written.
	pub written_at: OffsetDateTime,
	/// Scope string echoed by the token endpoint, when present.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub oauth_token_scope: Option<String>,
}
impl CacheEntry {
	/// Returns a builder for the provided cache triple.
	pub fn builder(
		client_id: impl Into<String>,
		audience: impl Into<String>,
		scope: ScopeSet,
	) -> CacheEntryBuilder {
		CacheEntryBuilder::new(client_id.into(), audience.into(), scope)
	}

	/// Cache key addressing this entry.
	pub fn key(&self) -> CacheKey {
		CacheKey::new(self.client_id.clone(), self.audience.clone(), self.scope.clone())
	}

	/// Re-stamps `written_at` and recomputes `expires_at` from `expires_in`.
	pub fn stamp(&mut self, now: OffsetDateTime) {
		self.written_at = now;
		self.expires_at = now.saturating_add(Duration::seconds(self.expires_in));
	}

	/// Computes the freshness at `instant` with the provided expiry margin.
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> EntryStatus {
		if instant >= self.expires_at {
			return EntryStatus::Expired;
		}
		// A stored expiry too close to the calendar limit to subtract from counts as expired.
		match self.expires_at.checked_sub(margin) {
			Some(threshold) if instant < threshold => EntryStatus::Fresh,
			Some(_) => EntryStatus::Expiring,
			None => EntryStatus::Expired,
		}
	}

	/// Returns `true` when the access token may be handed out at `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		matches!(self.status_at(instant, margin), EntryStatus::Fresh)
	}

	/// Returns `true` once the access token reached its expiry instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant, Duration::ZERO), EntryStatus::Expired)
	}
}
impl Debug for CacheEntry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheEntry")
			.field("client_id", &self.client_id)
			.field("audience", &self.audience)
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("expires_at", &self.expires_at)
			.field("written_at", &self.written_at)
			.finish()
	}
}

/// Builder for [`CacheEntry`].
#[derive(Clone, Debug)]
pub struct CacheEntryBuilder {
	client_id: String,
	audience: String,
	scope: ScopeSet,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	id_token: Option<String>,
	decoded_token: Option<DecodedToken>,
	expires_in: Option<i64>,
	written_at: Option<OffsetDateTime>,
	oauth_token_scope: Option<String>,
}
impl CacheEntryBuilder {
	fn new(client_id: String, audience: String, scope: ScopeSet) -> Self {
		Self {
			client_id,
			audience,
			scope,
			access_token: None,
			refresh_token: None,
			id_token: None,
			decoded_token: None,
			expires_in: None,
			written_at: None,
			oauth_token_scope: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Sets the refresh token from an optional value.
	pub fn maybe_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Provides the raw ID token and its verified projection.
	pub fn id_token(mut self, raw: impl Into<String>, decoded: DecodedToken) -> Self {
		self.id_token = Some(raw.into());
		self.decoded_token = Some(decoded);

		self
	}

	/// Sets the lifetime in seconds.
	pub fn expires_in(mut self, seconds: i64) -> Self {
		self.expires_in = Some(seconds);

		self
	}

	/// Sets the write instant; `expires_at` is derived from it.
	pub fn written_at(mut self, instant: OffsetDateTime) -> Self {
		self.written_at = Some(instant);

		self
	}

	/// Records the scope string echoed by the token endpoint.
	pub fn oauth_token_scope(mut self, scope: Option<String>) -> Self {
		self.oauth_token_scope = scope;

		self
	}

	/// Consumes the builder and produces a [`CacheEntry`].
	pub fn build(self) -> Result<CacheEntry, CacheEntryBuilderError> {
		let access_token = self.access_token.ok_or(CacheEntryBuilderError::MissingAccessToken)?;
		let expires_in = self.expires_in.ok_or(CacheEntryBuilderError::MissingExpiresIn)?;

		if expires_in <= 0 {
			return Err(CacheEntryBuilderError::NonPositiveExpiresIn);
		}

		let written_at = self.written_at.unwrap_or_else(OffsetDateTime::now_utc);

		Ok(CacheEntry {
			client_id: self.client_id,
			audience: self.audience,
			scope: self.scope,
			access_token,
			refresh_token: self.refresh_token,
			id_token: self.id_token,
			decoded_token: self.decoded_token,
			expires_in,
			expires_at: written_at.saturating_add(Duration::seconds(expires_in)),
			written_at,
			oauth_token_scope: self.oauth_token_scope,
		})
	}
}
