//! Authorization code login with PKCE, the e-mail verification detour, and external token
//! intake.
//!
//! The client never drives a user agent. [`SlashAuthClient::start_login`] returns the authorize
//! URL inside a [`LoginTransaction`]; whoever renders it feeds the callback parameters back to
//! [`SlashAuthClient::complete_login`]. When the server parks the login until an e-mail address
//! is verified, the transaction secrets are kept in the client's continued-interaction slot and
//! [`SlashAuthClient::continue_login`] resumes from there.

mod transaction;

pub use transaction::*;

// self
use crate::{
	_prelude::*,
	auth::{Account, DecodedToken, OrganizationId},
	cache::CacheKey,
	flows::{GetTokensOptions, SlashAuthClient, refresh},
	http::{TokenEndpointResponse, TokenRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	verify::VerificationError,
};
use transaction::TransactionSeed;

/// Options accepted by [`SlashAuthClient::start_login`] and [`SlashAuthClient::continue_login`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginOptions {
	/// Redirect URI; defaults to the one configured on the client.
	pub redirect_uri: Option<Url>,
	/// Wallet address signing in.
	pub wallet_address: Option<String>,
	/// Links the new identity to the current session, using this value as `login_hint`.
	pub connect_accounts: Option<String>,
	/// Organization the session is requested for.
	pub organization: Option<OrganizationId>,
}

/// Parameters delivered to the redirect URI.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LoginCallback {
	/// State echoed by the server.
	#[serde(default)]
	pub state: String,
	/// Authorization code.
	#[serde(default)]
	pub code: Option<String>,
	/// OAuth error code.
	#[serde(default)]
	pub error: Option<String>,
	/// OAuth error description.
	#[serde(default)]
	pub error_description: Option<String>,
	/// Present when the server needs another step before issuing a code.
	#[serde(default, rename = "needsAdditionalLogin")]
	pub needs_additional_login: Option<AdditionalLogin>,
}

/// Extra step requested by the server during login.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AdditionalLogin {
	/// The user must verify an e-mail address.
	#[serde(default, rename = "requiresEmailVerification")]
	pub requires_email_verification: bool,
	/// Interaction to continue once the address is verified.
	#[serde(default, rename = "interactionID")]
	pub interaction_id: String,
}

impl SlashAuthClient {
	/// Prepares a login: fresh PKCE pair, state and nonce, plus the `/auth` URL to visit.
	pub async fn start_login(&self, options: LoginOptions) -> Result<LoginTransaction> {
		let seed = TransactionSeed::generate();
		let authorize_url = self.options.authorize_endpoint.clone();

		self.build_transaction(authorize_url, &options, seed).await
	}

	/// Resumes the login parked by [`Error::EmailRequired`].
	///
	/// The parked state, nonce and PKCE verifier are reused and the slot is emptied. Fails with
	/// [`Error::InvalidState`] when nothing is parked.
	pub async fn continue_login(&self, options: LoginOptions) -> Result<LoginTransaction> {
		let interaction = self.continued.lock().take().ok_or(Error::InvalidState)?;
		let mut url = self.options.continue_auth_endpoint.clone();

		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push(&interaction.interaction_id);
		}

		self.build_transaction(url, &options, TransactionSeed::resume(interaction)).await
	}

	/// Interaction parked by the last login that required e-mail verification.
	pub fn continued_interaction(&self) -> Option<ContinuedInteraction> {
		self.continued.lock().clone()
	}

	/// Finishes a login from its callback parameters and returns the signed-in account.
	///
	/// On success the tokens are cached, the authenticated marker is set and the organization hint
	/// follows the ID token's `org_id`.
	pub async fn complete_login(
		&self,
		transaction: LoginTransaction,
		callback: LoginCallback,
	) -> Result<Account> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "complete_login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.complete_login_inner(transaction, callback)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Stores tokens obtained outside the login flow, such as a token exchange.
	///
	/// The ID token is required and verified without a nonce; the entry is cached under the
	/// default audience and scope.
	pub async fn process_token(&self, response: TokenEndpointResponse) -> Result<Account> {
		let key = self.request_key(None, None);

		self.store_login(key, response, None, None).await
	}

	async fn complete_login_inner(
		&self,
		transaction: LoginTransaction,
		callback: LoginCallback,
	) -> Result<Account> {
		if let Some(AdditionalLogin { requires_email_verification: true, interaction_id }) =
			callback.needs_additional_login
		{
			*self.continued.lock() = Some(transaction.continued(interaction_id.clone()));

			return Err(Error::EmailRequired { interaction_id });
		}

		transaction.validate_state(&callback.state)?;

		if let Some(error) = callback.error {
			return Err(Error::LoginFailed { error, description: callback.error_description });
		}

		let code = callback.code.ok_or_else(|| Error::LoginFailed {
			error: "missing_code".into(),
			description: Some("The callback carried neither a code nor an error.".into()),
		})?;
		let request = TokenRequest::AuthorizationCode {
			client_id: self.options.client_id.as_str().to_owned(),
			code,
			code_verifier: transaction.code_verifier().to_owned(),
			audience: transaction.audience.clone(),
			scope: transaction.scope.clone(),
			redirect_uri: transaction.redirect_uri.clone(),
		};
		let response = self.endpoint.exchange(request).await?;
		let key = CacheKey::new(
			self.options.client_id.as_str(),
			transaction.audience.clone(),
			transaction.scope.clone(),
		);
		let organization = transaction.organization.as_ref().map(|org| org.as_str().to_owned());

		self.store_login(key, response, Some(transaction.nonce.clone()), organization).await
	}

	async fn store_login(
		&self,
		key: CacheKey,
		response: TokenEndpointResponse,
		nonce: Option<String>,
		organization_id: Option<String>,
	) -> Result<Account> {
		response.validate()?;

		let id_token = response.id_token.clone().ok_or(VerificationError::MissingIdToken)?;
		let decoded = self.verify_id_token(&id_token, &key.audience, nonce, organization_id).await?;
		let DecodedToken { claims, user } = decoded.clone();
		let entry = refresh::build_entry(&key, response, Some(decoded), None, None)?;

		self.cache.set(entry).await?;
		self.mark_authenticated();
		self.session_cookies.set_organization_hint(
			self.cookies.as_ref(),
			claims.org_id.as_deref(),
			self.options.session_check_expiry_days,
		);

		Ok(user)
	}

	async fn build_transaction(
		&self,
		mut authorize_url: Url,
		options: &LoginOptions,
		seed: TransactionSeed,
	) -> Result<LoginTransaction> {
		let audience = self.options.default_audience().to_owned();
		let scope = self.request_scope(None);
		let redirect_uri = options.redirect_uri.clone().or_else(|| self.options.redirect_uri.clone());
		let hints = match &options.connect_accounts {
			Some(login_hint) => self.connect_hints(login_hint).await,
			None => Vec::new(),
		};

		{
			let mut pairs = authorize_url.query_pairs_mut();

			pairs.append_pair("client_id", self.options.client_id.as_str());

			if let Some(uri) = &redirect_uri {
				pairs.append_pair("redirect_uri", uri.as_str());
			}

			pairs.append_pair("response_type", "code id_token");
			pairs.append_pair("code_challenge", seed.code_challenge());
			pairs.append_pair("code_challenge_method", seed.code_challenge_method().as_str());
			pairs.append_pair("state", seed.state());
			pairs.append_pair("nonce", seed.nonce());
			pairs.append_pair("scope", &scope.normalized());
			pairs.append_pair("prompt", "consent");

			if let Some(address) = &options.wallet_address {
				pairs.append_pair("wallet_address", address);
			}
			if let Some(organization) = &options.organization {
				pairs.append_pair("organization", organization.as_str());
			}

			pairs.extend_pairs(hints);
		}

		Ok(LoginTransaction::new(
			audience,
			scope,
			redirect_uri,
			options.organization.clone(),
			authorize_url,
			seed,
		))
	}

	// Hints linking the new identity to the current session; empty without a session.
	async fn connect_hints(&self, login_hint: &str) -> Vec<(&'static str, String)> {
		match self.get_detailed_tokens(GetTokensOptions::default()).await {
			Ok(detailed) => match detailed.id_token {
				Some(id_token) => vec![
					("id_token_hint", id_token),
					("login_hint", login_hint.to_owned()),
					("merge", "true".to_owned()),
				],
				None => Vec::new(),
			},
			Err(e) => {
				obs::debug_event(
					FlowKind::Login,
					"connect_accounts",
					&format!("No session to connect: {e}"),
				);

				Vec::new()
			},
		}
	}
}
