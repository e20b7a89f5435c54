//! Client-level error types shared across cache, lock, and flow layers.
//!
//! Every error is `Clone` so the single-flight coordinator can hand one settled outcome to all
//! callers waiting on the same token request.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::cache::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The ID token returned by the token endpoint failed verification.
	#[error(transparent)]
	Verification(#[from] crate::verify::VerificationError),

	/// The refresh lock could not be acquired within the retry budget; retry later.
	#[error("Timed out waiting for the token refresh lock.")]
	Timeout,
	/// No refresh token is cached for the requested audience.
	#[error("Not logged in.")]
	NotLoggedIn,
	/// The token endpoint rejected the session (HTTP 401 or 403).
	#[error("Token endpoint rejected the session with HTTP {status}: {reason}.")]
	Unauthorized {
		/// HTTP status returned by the token endpoint.
		status: u16,
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The `state` returned by the authorization server does not match the transaction.
	#[error("Authorization state mismatch.")]
	InvalidState,
	/// The authorization server reported an error in the login callback.
	#[error("Login failed: {error}.")]
	LoginFailed {
		/// OAuth error code.
		error: String,
		/// Human-readable description, when supplied.
		description: Option<String>,
	},
	/// The login requires an e-mail verification step before tokens can be issued.
	#[error("Login requires e-mail verification for interaction {interaction_id}.")]
	EmailRequired {
		/// Interaction identifier used to continue the login.
		interaction_id: String,
	},
}
impl Error {
	/// Returns `true` for failures that mean the session is no longer authorized.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Unauthorized { .. })
	}

	/// HTTP status attached to the error, when one is known.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Unauthorized { status, .. } => Some(*status),
			Self::Transient(TransientError::TokenEndpoint { status, .. })
			| Self::Transient(TransientError::TokenResponseParse { status, .. }) => *status,
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// The configured domain cannot be turned into a URL.
	#[error("Domain `{domain}` is not a valid URL.")]
	InvalidDomain {
		/// Domain as supplied by the caller.
		domain: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An endpoint uses a scheme other than HTTP(S).
	#[error("The {endpoint} endpoint must use http or https: {url}.")]
	UnsupportedScheme {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Client identifier failed validation.
	#[error("Client identifier is invalid.")]
	InvalidClientId(#[from] crate::auth::IdentifierError),
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Cache entry builder validation failed.
	#[error("Unable to build cache entry.")]
	EntryBuild(#[from] crate::auth::CacheEntryBuilderError),
	/// Lock retry settings cannot make progress.
	#[error("Lock settings must allow at least one attempt with a positive TTL.")]
	InvalidLockSettings,
	/// Client options could not be parsed.
	#[error("Client options are malformed.")]
	MalformedOptions {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or client-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, TLS).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{cache::StoreError, verify::VerificationError};

	#[test]
	fn store_error_converts_into_client_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let client_error: Error = store_error.clone().into();

		assert!(matches!(client_error, Error::Storage(_)));
		assert!(client_error.to_string().contains("disk unavailable"));

		let source = StdError::source(&client_error)
			.expect("Client error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn status_is_exposed_for_endpoint_failures() {
		let unauthorized = Error::Unauthorized { status: 403, reason: "forbidden".into() };
		let transient: Error = TransientError::TokenEndpoint {
			message: "upstream".into(),
			status: Some(502),
			retry_after: None,
		}
		.into();

		assert!(unauthorized.is_unauthorized());
		assert_eq!(unauthorized.status(), Some(403));
		assert_eq!(transient.status(), Some(502));
		assert_eq!(Error::Timeout.status(), None);
	}

	#[test]
	fn cloned_errors_keep_their_sources() {
		let original: Error = TransportError::network(std::io::Error::other("reset")).into();
		let cloned = original.clone();

		assert_eq!(original.to_string(), cloned.to_string());
		assert!(StdError::source(&cloned).is_some());

		let verification: Error =
			VerificationError::Rejected { reason: "bad signature".into() }.into();

		assert!(verification.to_string().contains("bad signature"));
	}
}
