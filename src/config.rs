//! Client options: endpoint derivation, defaults, validation, and JSON loading.

// std
use std::path::PathBuf;
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet},
	cookie::CookieOptions,
	lock::LockSettings,
};

/// Audience used when neither the call nor the client options name one.
pub const DEFAULT_AUDIENCE: &str = "default";
/// Default margin before expiry at which cached access tokens stop being handed out.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(60);
/// Default lifetime of the authenticated marker cookie.
pub const DEFAULT_SESSION_CHECK_EXPIRY_DAYS: u32 = 1;
/// Default timeout applied to token endpoint calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::seconds(10);
/// Default clock skew tolerance handed to the ID token verifier.
pub const DEFAULT_LEEWAY: Duration = Duration::seconds(60);

/// Where the client keeps its token cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLocation {
	/// Process memory; lost on exit.
	#[default]
	Memory,
	/// JSON snapshot on disk, shareable between processes.
	File {
		/// Snapshot location.
		path: PathBuf,
	},
}

/// Client descriptor sent to the server in the `X-SlashAuth-Client` header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
	/// SDK name.
	pub name: String,
	/// SDK version.
	pub version: String,
}
impl ClientInfo {
	/// Base64 of the JSON descriptor, as sent on the wire.
	pub fn header_value(&self) -> String {
		STANDARD.encode(serde_json::to_vec(self).unwrap_or_default())
	}
}
impl Default for ClientInfo {
	fn default() -> Self {
		Self { name: env!("CARGO_PKG_NAME").into(), version: env!("CARGO_PKG_VERSION").into() }
	}
}

/// Validated client configuration.
#[derive(Clone, Debug)]
pub struct ClientOptions {
	/// Client identifier.
	pub client_id: ClientId,
	/// Tenant base URL every endpoint hangs off.
	pub domain: Url,
	/// Expected ID token issuer.
	pub issuer: String,
	/// Token endpoint (`/oauth/token`).
	pub token_endpoint: Url,
	/// Authorize endpoint (`/auth`).
	pub authorize_endpoint: Url,
	/// Logout endpoint (`/auth/logout`).
	pub logout_endpoint: Url,
	/// Base of continued-interaction URLs (`/auth/continueAuth/`).
	pub continue_auth_endpoint: Url,
	/// Default audience for token requests.
	pub audience: Option<String>,
	/// Scope added to every token request on top of the default scope.
	pub scope: Option<String>,
	/// Redirect URI sent with login and refresh requests.
	pub redirect_uri: Option<Url>,
	/// Domain for session cookies.
	pub cookie_domain: Option<String>,
	/// Refresh lock retry policy.
	pub lock: LockSettings,
	/// Margin before expiry at which cached tokens are treated as stale.
	pub expiry_margin: Duration,
	/// Lifetime of the authenticated marker cookie in days.
	pub session_check_expiry_days: u32,
	/// Timeout for token endpoint calls.
	pub http_timeout: Duration,
	/// Clock skew tolerance for ID token verification.
	pub leeway: Duration,
	/// Maximum authentication age enforced by the verifier.
	pub max_age: Option<Duration>,
	/// Cache backend selection.
	pub cache_location: CacheLocation,
	/// Descriptor sent with every request.
	pub client_info: ClientInfo,
}
impl ClientOptions {
	/// Starts a builder for the tenant `domain` and `client_id`.
	pub fn builder(domain: impl Into<String>, client_id: impl Into<String>) -> ClientOptionsBuilder {
		ClientOptionsBuilder::new(domain.into(), client_id.into())
	}

	/// Parses options from JSON, reporting the path of the first offending field.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);
		let file: OptionsFile = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| ConfigError::MalformedOptions { source: Arc::new(e) })?;

		file.into_builder().build()
	}

	/// Audience used when the call does not name one.
	pub fn default_audience(&self) -> &str {
		self.audience.as_deref().unwrap_or(DEFAULT_AUDIENCE)
	}

	/// Attributes for the authenticated marker cookie.
	pub fn cookie_options(&self) -> CookieOptions {
		CookieOptions {
			days_until_expire: self.session_check_expiry_days,
			cookie_domain: self.cookie_domain.clone(),
		}
	}
}

/// Builder for [`ClientOptions`].
#[derive(Clone, Debug)]
pub struct ClientOptionsBuilder {
	domain: String,
	client_id: String,
	client_subdomain: bool,
	issuer: Option<String>,
	token_endpoint: Option<Url>,
	audience: Option<String>,
	scope: Option<String>,
	redirect_uri: Option<Url>,
	cookie_domain: Option<String>,
	lock: LockSettings,
	expiry_margin: Duration,
	session_check_expiry_days: u32,
	http_timeout: Duration,
	leeway: Duration,
	max_age: Option<Duration>,
	cache_location: CacheLocation,
	client_info: ClientInfo,
}
impl ClientOptionsBuilder {
	fn new(domain: String, client_id: String) -> Self {
		Self {
			domain,
			client_id,
			client_subdomain: true,
			issuer: None,
			token_endpoint: None,
			audience: None,
			scope: None,
			redirect_uri: None,
			cookie_domain: None,
			lock: LockSettings::default(),
			expiry_margin: DEFAULT_EXPIRY_MARGIN,
			session_check_expiry_days: DEFAULT_SESSION_CHECK_EXPIRY_DAYS,
			http_timeout: DEFAULT_HTTP_TIMEOUT,
			leeway: DEFAULT_LEEWAY,
			max_age: None,
			cache_location: CacheLocation::default(),
			client_info: ClientInfo::default(),
		}
	}

	/// Controls whether the client identifier is prepended to the domain as a subdomain
	/// (enabled by default).
	pub fn client_subdomain(mut self, enabled: bool) -> Self {
		self.client_subdomain = enabled;

		self
	}

	/// Overrides the expected ID token issuer.
	pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
		self.issuer = Some(issuer.into());

		self
	}

	/// Overrides the token endpoint derived from the domain.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the default audience.
	pub fn audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = Some(audience.into());

		self
	}

	/// Sets the instance scope merged into every request.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Sets the redirect URI.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Sets the cookie domain.
	pub fn cookie_domain(mut self, domain: impl Into<String>) -> Self {
		self.cookie_domain = Some(domain.into());

		self
	}

	/// Replaces the whole lock policy.
	pub fn lock_settings(mut self, settings: LockSettings) -> Self {
		self.lock = settings;

		self
	}

	/// Sets the refresh lock TTL.
	pub fn lock_ttl(mut self, ttl: Duration) -> Self {
		self.lock.ttl = ttl;

		self
	}

	/// Sets the number of lock acquisition attempts.
	pub fn lock_attempts(mut self, attempts: u32) -> Self {
		self.lock.attempts = attempts;

		self
	}

	/// Sets the pause between lock acquisition attempts.
	pub fn lock_backoff(mut self, backoff: Duration) -> Self {
		self.lock.backoff = backoff;

		self
	}

	/// Sets the expiry margin; negative values clamp to zero.
	pub fn expiry_margin(mut self, margin: Duration) -> Self {
		self.expiry_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Sets the authenticated marker lifetime in days.
	pub fn session_check_expiry_days(mut self, days: u32) -> Self {
		self.session_check_expiry_days = days;

		self
	}

	/// Sets the token endpoint timeout.
	pub fn http_timeout(mut self, timeout: Duration) -> Self {
		self.http_timeout = timeout;

		self
	}

	/// Sets the verifier clock skew tolerance.
	pub fn leeway(mut self, leeway: Duration) -> Self {
		self.leeway = leeway;

		self
	}

	/// Sets the maximum authentication age.
	pub fn max_age(mut self, max_age: Duration) -> Self {
		self.max_age = Some(max_age);

		self
	}

	/// Selects the cache backend.
	pub fn cache_location(mut self, location: CacheLocation) -> Self {
		self.cache_location = location;

		self
	}

	/// Overrides the client descriptor sent to the server.
	pub fn client_info(mut self, info: ClientInfo) -> Self {
		self.client_info = info;

		self
	}

	/// Validates the configuration and derives every endpoint.
	pub fn build(self) -> Result<ClientOptions, ConfigError> {
		let client_id = ClientId::new(&self.client_id)?;

		if let Some(scope) = self.scope.as_deref() {
			ScopeSet::from_str(scope)?;
		}

		self.lock.validate()?;

		let origin = parse_origin(&self.domain)?;
		let issuer = self.issuer.unwrap_or_else(|| origin.to_string());
		let domain = if self.client_subdomain {
			with_client_subdomain(origin, client_id.as_str(), &self.domain)?
		} else {
			origin
		};
		let token_endpoint = match self.token_endpoint {
			Some(url) => url,
			None => join(&domain, "oauth/token", &self.domain)?,
		};

		ensure_http("token", &token_endpoint)?;

		if let Some(redirect_uri) = &self.redirect_uri {
			ensure_http("redirect", redirect_uri)?;
		}

		Ok(ClientOptions {
			authorize_endpoint: join(&domain, "auth", &self.domain)?,
			logout_endpoint: join(&domain, "auth/logout", &self.domain)?,
			continue_auth_endpoint: join(&domain, "auth/continueAuth/", &self.domain)?,
			client_id,
			domain,
			issuer,
			token_endpoint,
			audience: self.audience,
			scope: self.scope,
			redirect_uri: self.redirect_uri,
			cookie_domain: self.cookie_domain,
			lock: self.lock,
			expiry_margin: self.expiry_margin,
			session_check_expiry_days: self.session_check_expiry_days,
			http_timeout: self.http_timeout,
			leeway: self.leeway,
			max_age: self.max_age,
			cache_location: self.cache_location,
			client_info: self.client_info,
		})
	}
}

/// Subdomain label for a client identifier.
///
/// Identifiers that already form a valid lowercase label are used verbatim; anything else is
/// hex-encoded so case and punctuation survive DNS normalization.
pub fn client_subdomain_label(client_id: &str) -> String {
	let is_label = !client_id.is_empty()
		&& client_id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');

	if is_label {
		return client_id.to_owned();
	}

	client_id.bytes().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
	domain: String,
	client_id: String,
	#[serde(default)]
	client_subdomain: Option<bool>,
	#[serde(default)]
	issuer: Option<String>,
	#[serde(default)]
	token_endpoint: Option<Url>,
	#[serde(default)]
	audience: Option<String>,
	#[serde(default)]
	scope: Option<String>,
	#[serde(default)]
	redirect_uri: Option<Url>,
	#[serde(default)]
	cookie_domain: Option<String>,
	#[serde(default)]
	lock_ttl_ms: Option<i64>,
	#[serde(default)]
	lock_attempts: Option<u32>,
	#[serde(default)]
	lock_backoff_ms: Option<i64>,
	#[serde(default)]
	expiry_margin_secs: Option<i64>,
	#[serde(default)]
	session_check_expiry_days: Option<u32>,
	#[serde(default)]
	http_timeout_secs: Option<i64>,
	#[serde(default)]
	leeway_secs: Option<i64>,
	#[serde(default)]
	max_age_secs: Option<i64>,
	#[serde(default)]
	cache_location: Option<CacheLocation>,
}
impl OptionsFile {
	fn into_builder(self) -> ClientOptionsBuilder {
		let mut builder = ClientOptions::builder(self.domain, self.client_id);

		if let Some(enabled) = self.client_subdomain {
			builder = builder.client_subdomain(enabled);
		}

		builder.issuer = self.issuer;
		builder.token_endpoint = self.token_endpoint;
		builder.audience = self.audience;
		builder.scope = self.scope;
		builder.redirect_uri = self.redirect_uri;
		builder.cookie_domain = self.cookie_domain;

		if let Some(ms) = self.lock_ttl_ms {
			builder = builder.lock_ttl(Duration::milliseconds(ms));
		}
		if let Some(attempts) = self.lock_attempts {
			builder = builder.lock_attempts(attempts);
		}
		if let Some(ms) = self.lock_backoff_ms {
			builder = builder.lock_backoff(Duration::milliseconds(ms));
		}
		if let Some(secs) = self.expiry_margin_secs {
			builder = builder.expiry_margin(Duration::seconds(secs));
		}
		if let Some(days) = self.session_check_expiry_days {
			builder = builder.session_check_expiry_days(days);
		}
		if let Some(secs) = self.http_timeout_secs {
			builder = builder.http_timeout(Duration::seconds(secs));
		}
		if let Some(secs) = self.leeway_secs {
			builder = builder.leeway(Duration::seconds(secs));
		}
		if let Some(secs) = self.max_age_secs {
			builder = builder.max_age(Duration::seconds(secs));
		}
		if let Some(location) = self.cache_location {
			builder = builder.cache_location(location);
		}

		builder
	}
}

fn parse_origin(raw: &str) -> Result<Url, ConfigError> {
	let trimmed = raw.trim();
	let candidate = if trimmed.contains("://") { trimmed.to_owned() } else { format!("https://{trimmed}") };
	let mut url = Url::parse(&candidate)
		.map_err(|source| ConfigError::InvalidDomain { domain: raw.to_owned(), source })?;

	ensure_http("domain", &url)?;

	if url.host_str().is_none_or(str::is_empty) {
		return Err(ConfigError::InvalidDomain {
			domain: raw.to_owned(),
			source: url::ParseError::EmptyHost,
		});
	}
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}

fn with_client_subdomain(mut origin: Url, client_id: &str, raw: &str) -> Result<Url, ConfigError> {
	let host = origin.host_str().unwrap_or_default().to_owned();
	let prefixed = format!("{}.{host}", client_subdomain_label(client_id));

	origin
		.set_host(Some(&prefixed))
		.map_err(|source| ConfigError::InvalidDomain { domain: raw.to_owned(), source })?;

	Ok(origin)
}

fn join(base: &Url, path: &str, raw: &str) -> Result<Url, ConfigError> {
	base.join(path).map_err(|source| ConfigError::InvalidDomain { domain: raw.to_owned(), source })
}

fn ensure_http(endpoint: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"http" | "https" => Ok(()),
		_ => Err(ConfigError::UnsupportedScheme { endpoint, url: url.to_string() }),
	}
}
