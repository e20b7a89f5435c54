//! Token endpoint transport.
//!
//! [`TokenEndpoint`] is the client's only dependency on an HTTP stack. The default
//! [`ReqwestTokenEndpoint`] issues `GET /oauth/token` with the grant parameters in the query
//! string and classifies failures into the crate's error taxonomy.

// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
#[cfg(feature = "reqwest")] use crate::config::ClientOptions;
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Header carrying the base64 client descriptor.
pub const CLIENT_HEADER: &str = "X-SlashAuth-Client";
/// Upper bound accepted for `expires_in` (ten years).
pub const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Boxed future returned by token endpoints.
pub type EndpointFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenEndpointResponse>> + 'a + Send>>;

/// Performs token grants against the authorization server.
pub trait TokenEndpoint
where
	Self: Send + Sync,
{
	/// Executes `request` and returns the parsed token response.
	fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_>;
}

/// Grant sent to the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenRequest {
	/// `grant_type=refresh_token`.
	RefreshToken {
		/// Client identifier.
		client_id: String,
		/// Refresh token being redeemed.
		refresh_token: TokenSecret,
		/// Requested audience.
		audience: String,
		/// Requested scopes.
		scope: ScopeSet,
		/// Redirect URI registered for the client.
		redirect_uri: Option<Url>,
	},
	/// `grant_type=authorization_code`.
	AuthorizationCode {
		/// Client identifier.
		client_id: String,
		/// Authorization code from the callback.
		code: String,
		/// PKCE verifier matching the challenge sent to `/auth`.
		code_verifier: String,
		/// Requested audience.
		audience: String,
		/// Requested scopes.
		scope: ScopeSet,
		/// Redirect URI sent to `/auth`.
		redirect_uri: Option<Url>,
	},
}
impl TokenRequest {
	/// OAuth `grant_type` value.
	pub fn grant_type(&self) -> &'static str {
		match self {
			Self::RefreshToken { .. } => "refresh_token",
			Self::AuthorizationCode { .. } => "authorization_code",
		}
	}

	/// Audience the grant targets.
	pub fn audience(&self) -> &str {
		match self {
			Self::RefreshToken { audience, .. } | Self::AuthorizationCode { audience, .. } =>
				audience,
		}
	}

	/// Scopes the grant requests.
	pub fn scope(&self) -> &ScopeSet {
		match self {
			Self::RefreshToken { scope, .. } | Self::AuthorizationCode { scope, .. } => scope,
		}
	}

	/// Query parameters sent on the wire.
	pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
		let mut pairs = vec![("grant_type", self.grant_type().to_owned())];

		match self {
			Self::RefreshToken { client_id, refresh_token, audience, scope, redirect_uri } => {
				pairs.push(("client_id", client_id.clone()));
				pairs.push(("refresh_token", refresh_token.expose().to_owned()));
				pairs.push(("audience", audience.clone()));
				pairs.push(("scope", scope.normalized()));

				if let Some(uri) = redirect_uri {
					pairs.push(("redirect_uri", uri.to_string()));
				}
			},
			Self::AuthorizationCode {
				client_id,
				code,
				code_verifier,
				audience,
				scope,
				redirect_uri,
			} => {
				pairs.push(("client_id", client_id.clone()));
				pairs.push(("code", code.clone()));
				pairs.push(("code_verifier", code_verifier.clone()));
				pairs.push(("audience", audience.clone()));
				pairs.push(("scope", scope.normalized()));

				if let Some(uri) = redirect_uri {
					pairs.push(("redirect_uri", uri.to_string()));
				}
			},
		}

		pairs
	}
}
impl Debug for TokenRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRequest")
			.field("grant_type", &self.grant_type())
			.field("audience", &self.audience())
			.field("scope", self.scope())
			.finish_non_exhaustive()
	}
}

/// Successful token endpoint payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEndpointResponse {
	/// Access token.
	pub access_token: String,
	/// Rotated refresh token, when issued.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// ID token, when issued.
	#[serde(default)]
	pub id_token: Option<String>,
	/// Access token lifetime in seconds.
	pub expires_in: i64,
	/// Granted scope string, when echoed.
	#[serde(default)]
	pub scope: Option<String>,
	/// Client the tokens were issued to, when echoed.
	#[serde(default)]
	pub client_id: Option<String>,
}
impl TokenEndpointResponse {
	/// Rejects lifetimes the cache cannot represent.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.expires_in <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn);
		}
		if self.expires_in > MAX_EXPIRES_IN_SECS {
			return Err(ConfigError::ExpiresInOutOfRange);
		}

		Ok(())
	}
}
impl Debug for TokenEndpointResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenEndpointResponse")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.field("client_id", &self.client_id)
			.finish()
	}
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

/// [`TokenEndpoint`] backed by reqwest.
///
/// Redirects are not followed; a token endpoint answers directly.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTokenEndpoint {
	client: ReqwestClient,
	endpoint: Url,
	client_header: String,
}
#[cfg(feature = "reqwest")]
impl ReqwestTokenEndpoint {
	/// Builds a transport with the timeout and endpoint from `options`.
	pub fn new(options: &ClientOptions) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.timeout(options.http_timeout.unsigned_abs())
			.build()?;

		Ok(Self::with_client(client, options))
	}

	/// Wraps an existing reqwest client.
	pub fn with_client(client: ReqwestClient, options: &ClientOptions) -> Self {
		Self {
			client,
			endpoint: options.token_endpoint.clone(),
			client_header: options.client_info.header_value(),
		}
	}

	/// Endpoint requests are sent to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn execute(&self, request: TokenRequest) -> Result<TokenEndpointResponse> {
		let mut url = self.endpoint.clone();

		url.query_pairs_mut().extend_pairs(request.query_pairs());

		let response = self
			.client
			.get(url)
			.header(CLIENT_HEADER, &self.client_header)
			.header(ACCEPT, "application/json")
			.send()
			.await
			.map_err(TransportError::from)?;
		let status = response.status();
		let retry_after = parse_retry_after(response.headers());
		let body = response.bytes().await.map_err(TransportError::from)?;

		if status.is_success() {
			let mut deserializer = serde_json::Deserializer::from_slice(&body);

			return serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
				TransientError::TokenResponseParse {
					source: Arc::new(e),
					status: Some(status.as_u16()),
				}
				.into()
			});
		}

		let detail = serde_json::from_slice::<ErrorBody>(&body).unwrap_or_default();
		let reason = detail
			.error_description
			.or(detail.error)
			.or_else(|| status.canonical_reason().map(str::to_owned))
			.unwrap_or_else(|| "unknown error".into());

		if matches!(status.as_u16(), 401 | 403) {
			return Err(Error::Unauthorized { status: status.as_u16(), reason });
		}

		Err(TransientError::TokenEndpoint { message: reason, status: Some(status.as_u16()), retry_after }
			.into())
	}
}
#[cfg(feature = "reqwest")]
impl TokenEndpoint for ReqwestTokenEndpoint {
	fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_> {
		Box::pin(self.execute(request))
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<i64>() {
		return Some(Duration::seconds(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
