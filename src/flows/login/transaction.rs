// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, ScopeSet},
};

const STATE_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// One login attempt produced by [`start_login`](crate::flows::SlashAuthClient::start_login).
///
/// Hand it back to [`complete_login`](crate::flows::SlashAuthClient::complete_login) together
/// with the callback parameters.
#[derive(Clone)]
pub struct LoginTransaction {
	/// Audience the resulting tokens are cached under.
	pub audience: String,
	/// Scopes requested from the authorization server.
	pub scope: ScopeSet,
	/// Opaque state value that must round-trip through the callback.
	pub state: String,
	/// Nonce the ID token must echo.
	pub nonce: String,
	/// Redirect URI sent to `/auth`, if any.
	pub redirect_uri: Option<Url>,
	/// Organization the ID token must belong to, if any.
	pub organization: Option<OrganizationId>,
	/// URL the user agent should visit.
	pub authorize_url: Url,
	pkce: PkcePair,
}
impl LoginTransaction {
	pub(super) fn new(
		audience: String,
		scope: ScopeSet,
		redirect_uri: Option<Url>,
		organization: Option<OrganizationId>,
		authorize_url: Url,
		seed: TransactionSeed,
	) -> Self {
		Self {
			audience,
			scope,
			state: seed.state,
			nonce: seed.nonce,
			redirect_uri,
			organization,
			authorize_url,
			pkce: seed.pkce,
		}
	}

	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// PKCE challenge method (always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}

	/// Validates the `state` returned by the authorization server.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state { Ok(()) } else { Err(Error::InvalidState) }
	}

	pub(super) fn code_verifier(&self) -> &str {
		&self.pkce.verifier
	}

	pub(super) fn continued(&self, interaction_id: String) -> ContinuedInteraction {
		ContinuedInteraction {
			state: self.state.clone(),
			nonce: self.nonce.clone(),
			code_verifier: self.pkce.verifier.clone(),
			interaction_id,
		}
	}
}
impl Debug for LoginTransaction {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginTransaction")
			.field("audience", &self.audience)
			.field("scope", &self.scope)
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("organization", &self.organization)
			.field("authorize_url", &self.authorize_url)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish_non_exhaustive()
	}
}

/// Login parked until the user verifies an e-mail address.
#[derive(Clone, PartialEq, Eq)]
pub struct ContinuedInteraction {
	/// State of the interrupted login.
	pub state: String,
	/// Nonce of the interrupted login.
	pub nonce: String,
	/// PKCE verifier of the interrupted login.
	pub code_verifier: String,
	/// Server-side interaction identifier.
	pub interaction_id: String,
}
impl Debug for ContinuedInteraction {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ContinuedInteraction")
			.field("state", &self.state)
			.field("interaction_id", &self.interaction_id)
			.finish_non_exhaustive()
	}
}

/// Secrets a transaction is built from: fresh ones, or those of a parked interaction.
pub(super) struct TransactionSeed {
	state: String,
	nonce: String,
	pkce: PkcePair,
}
impl TransactionSeed {
	pub(super) fn generate() -> Self {
		Self {
			state: random_string(STATE_LEN),
			nonce: random_string(NONCE_LEN),
			pkce: PkcePair::from_verifier(random_string(PKCE_VERIFIER_LEN)),
		}
	}

	pub(super) fn resume(interaction: ContinuedInteraction) -> Self {
		Self {
			state: interaction.state,
			nonce: interaction.nonce,
			pkce: PkcePair::from_verifier(interaction.code_verifier),
		}
	}

	pub(super) fn state(&self) -> &str {
		&self.state
	}

	pub(super) fn nonce(&self) -> &str {
		&self.nonce
	}

	pub(super) fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	pub(super) fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn from_verifier(verifier: String) -> Self {
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn pkce_challenge_matches_rfc_7636_example() {
		// RFC 7636 appendix B.
		let challenge = compute_pkce_challenge("dBjftJeZ4CVP-1mB92K27uhbUJU1p1r7wW1gFWFOEjXk");

		assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
	}

	#[test]
	fn resumed_seed_keeps_the_parked_secrets() {
		let fresh = TransactionSeed::generate();
		let parked = ContinuedInteraction {
			state: fresh.state.clone(),
			nonce: fresh.nonce.clone(),
			code_verifier: fresh.pkce.verifier.clone(),
			interaction_id: "interaction-1".into(),
		};
		let resumed = TransactionSeed::resume(parked.clone());

		assert_eq!(resumed.state, fresh.state);
		assert_eq!(resumed.nonce, fresh.nonce);
		assert_eq!(resumed.pkce.challenge, fresh.pkce.challenge);
		assert_eq!(fresh.state.len(), STATE_LEN);
		assert_eq!(fresh.pkce.verifier.len(), PKCE_VERIFIER_LEN);
		assert!(!format!("{parked:?}").contains(&parked.code_verifier));
	}
}
