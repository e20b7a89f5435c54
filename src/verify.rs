//! ID token verification contract.
//!
//! Signature checking is out of scope for this crate; callers inject an [`IdTokenVerifier`] that
//! validates the JWT and returns its decoded projection.

// self
use crate::{_prelude::*, auth::DecodedToken};

/// Boxed future returned by verifiers.
pub type VerifyFuture<'a> =
	Pin<Box<dyn Future<Output = Result<DecodedToken, VerificationError>> + 'a + Send>>;

/// Inputs a verifier needs to validate one ID token.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyRequest {
	/// Expected issuer.
	pub issuer: String,
	/// Expected audience (the client identifier).
	pub audience: String,
	/// Raw JWT.
	pub id_token: String,
	/// Nonce the token must echo, when the flow sent one.
	pub nonce: Option<String>,
	/// Organization the token must belong to, when known.
	pub organization_id: Option<String>,
	/// Clock skew tolerance.
	pub leeway: Duration,
	/// Maximum authentication age, when enforced.
	pub max_age: Option<Duration>,
	/// Instant used for time-based claims.
	pub now: OffsetDateTime,
}
impl Debug for VerifyRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("VerifyRequest")
			.field("issuer", &self.issuer)
			.field("audience", &self.audience)
			.field("id_token", &"<redacted>")
			.field("nonce", &self.nonce)
			.field("organization_id", &self.organization_id)
			.field("leeway", &self.leeway)
			.field("max_age", &self.max_age)
			.field("now", &self.now)
			.finish()
	}
}

/// Validates ID tokens returned by the token endpoint.
pub trait IdTokenVerifier
where
	Self: Send + Sync,
{
	/// Verifies `request.id_token` and returns its decoded claims and account projection.
	fn verify(&self, request: VerifyRequest) -> VerifyFuture<'_>;
}

/// Verification failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum VerificationError {
	/// The verifier rejected the token.
	#[error("ID token rejected: {reason}.")]
	Rejected {
		/// Verifier-supplied reason.
		reason: String,
	},
	/// The flow required an ID token but the response carried none.
	#[error("The token response did not include an ID token.")]
	MissingIdToken,
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn debug_redacts_the_raw_token() {
		let request = VerifyRequest {
			issuer: "https://auth.example.com/".into(),
			audience: "client".into(),
			id_token: "header.payload.signature".into(),
			nonce: Some("n".into()),
			organization_id: None,
			leeway: Duration::seconds(60),
			max_age: None,
			now: macros::datetime!(2025-01-01 00:00 UTC),
		};
		let debug = format!("{request:?}");

		assert!(!debug.contains("payload"));
		assert!(debug.contains("<redacted>"));
	}
}
