//! Cache addressing: the `(client_id, audience, scope)` triple and its storage-key form.

// crates.io
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
// self
use crate::{_prelude::*, auth::ScopeSet};

/// Prefix shared by every key the client writes into a store.
pub const KEY_PREFIX: &str = "@@slashauth@@";
/// Separator between storage-key components.
pub const KEY_SEPARATOR: &str = "::";

// `:` is escaped so the separator never appears inside a component; `%` keeps decoding lossless.
// Escaping `"` lets keys be picked out of a manifest that no longer parses.
const COMPONENT: &AsciiSet = &CONTROLS.add(b'%').add(b':').add(b' ').add(b'"');

/// Identifies the token set cached for one client, audience, and scope combination.
///
/// Construction never fails; missing components are empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Client identifier.
	pub client_id: String,
	/// Audience the tokens are issued for.
	pub audience: String,
	/// Normalized scope set.
	pub scope: ScopeSet,
}
impl CacheKey {
	/// Builds a key from its components.
	pub fn new(client_id: impl Into<String>, audience: impl Into<String>, scope: ScopeSet) -> Self {
		Self { client_id: client_id.into(), audience: audience.into(), scope }
	}

	/// Canonical string written to the store: `@@slashauth@@::<client_id>::<audience>::<scope>`.
	pub fn storage_key(&self) -> String {
		format!(
			"{KEY_PREFIX}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
			utf8_percent_encode(&self.client_id, COMPONENT),
			utf8_percent_encode(&self.audience, COMPONENT),
			utf8_percent_encode(&self.scope.normalized(), COMPONENT),
		)
	}

	/// Parses a storage key back into a [`CacheKey`].
	///
	/// Returns `None` for keys this client did not write, including the key manifest.
	pub fn from_storage_key(raw: &str) -> Option<Self> {
		let rest = raw.strip_prefix(KEY_PREFIX)?.strip_prefix(KEY_SEPARATOR)?;
		let mut parts = rest.split(KEY_SEPARATOR);
		let client_id = decode(parts.next()?)?;
		let audience = decode(parts.next()?)?;
		let scope = decode(parts.next()?)?;

		if parts.next().is_some() {
			return None;
		}

		Some(Self { client_id, audience, scope: ScopeSet::from_delimited(&scope) })
	}

	/// Returns `true` when `candidate` can serve a request for `self`.
	///
	/// The client and audience must be equal and the candidate's scopes must cover every
	/// requested scope.
	pub fn matches(&self, candidate: &CacheKey) -> bool {
		self.client_id == candidate.client_id
			&& self.audience == candidate.audience
			&& candidate.scope.is_superset_of(&self.scope)
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.storage_key())
	}
}

/// Returns `true` for keys written by this crate for any client.
pub fn is_slashauth_key(raw: &str) -> bool {
	raw.strip_prefix(KEY_PREFIX).is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
}

/// Storage key of the manifest tracking a client's entries.
pub fn manifest_key(client_id: &str) -> String {
	format!("{KEY_PREFIX}{KEY_SEPARATOR}{}", utf8_percent_encode(client_id, COMPONENT))
}

fn decode(component: &str) -> Option<String> {
	percent_decode_str(component).decode_utf8().ok().map(|decoded| decoded.into_owned())
}
