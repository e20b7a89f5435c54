//! Decoded ID token projections: raw claims plus the account view derived from them.

// self
use crate::_prelude::*;

/// Claims carried by a verified ID token.
///
/// Registered OIDC claims are typed; everything else lands in [`IdTokenClaims::extra`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdTokenClaims {
	/// Issuer.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub iss: Option<String>,
	/// Subject.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sub: Option<String>,
	/// Audience.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub aud: Option<String>,
	/// Expiry as seconds since the epoch.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub exp: Option<i64>,
	/// Not-before as seconds since the epoch.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub nbf: Option<i64>,
	/// Issued-at as seconds since the epoch.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub iat: Option<i64>,
	/// Authorized party.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub azp: Option<String>,
	/// Nonce echoed from the authorize request.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub nonce: Option<String>,
	/// Authentication time.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub auth_time: Option<i64>,
	/// Session identifier.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sid: Option<String>,
	/// Organization the session was issued for.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub org_id: Option<String>,
	/// Last profile update.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<String>,
	/// Wallets linked to the subject.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub wallet: Option<AccountWallets>,
	/// E-mail addresses linked to the subject.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<AccountEmails>,
	/// Social identities linked to the subject.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub socials: Option<AccountSocials>,
	/// Any claim not modeled above.
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}

/// Account view of the signed-in subject.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
	/// Subject identifier.
	pub sub: String,
	/// Client the session belongs to.
	pub client_id: String,
	/// Account kind reported by the server.
	#[serde(rename = "type")]
	pub account_type: String,
	/// Wallet flavor for wallet-based accounts.
	pub wallet_type: String,
	/// Linked wallets.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub wallet: Option<AccountWallets>,
	/// Linked e-mail addresses.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<AccountEmails>,
	/// Linked social identities.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub socials: Option<AccountSocials>,
}

/// Wallet addresses linked to an account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountWallets {
	/// Primary wallet address.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub default: Option<String>,
	/// Every linked address.
	pub all_wallets: Vec<String>,
	/// Address to wallet-type mapping.
	pub wallet_type_map: BTreeMap<String, String>,
}

/// E-mail addresses linked to an account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountEmails {
	/// Primary address.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub default: Option<String>,
	/// Every linked address.
	pub all_emails: Vec<String>,
}

/// Social identities linked to an account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSocials {
	/// Google identity.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub google: Option<SocialIdentity>,
	/// Discord identity.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub discord: Option<SocialIdentity>,
	/// Twitter identity.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub twitter: Option<SocialIdentity>,
}

/// One linked social identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialIdentity {
	/// E-mail address on the social provider.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Username on the social provider.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	/// Handle on the social provider.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub handle: Option<String>,
}

/// Verifier output stored alongside the raw ID token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedToken {
	/// Raw claims.
	pub claims: IdTokenClaims,
	/// Account projection.
	pub user: Account,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn claims_keep_unknown_fields() {
		let claims: IdTokenClaims = serde_json::from_str(
			r#"{"iss":"https://auth.example.com/","sub":"0xabc","org_id":"org-1","custom":42,
			"wallet":{"default":"0xabc","allWallets":["0xabc","0xdef"]}}"#,
		)
		.expect("Claims fixture should deserialize.");

		assert_eq!(claims.sub.as_deref(), Some("0xabc"));
		assert_eq!(claims.org_id.as_deref(), Some("org-1"));
		assert_eq!(claims.extra.get("custom"), Some(&serde_json::json!(42)));
		assert_eq!(
			claims.wallet.as_ref().map(|w| w.all_wallets.len()),
			Some(2),
			"Nested wallet claims use camelCase keys."
		);
	}

	#[test]
	fn account_tolerates_missing_fields() {
		let account: Account = serde_json::from_str(r#"{"sub":"user-1","type":"wallet"}"#)
			.expect("Sparse account should deserialize.");

		assert_eq!(account.account_type, "wallet");
		assert!(account.client_id.is_empty());
		assert!(account.email.is_none());
	}
}
