//! Scope modeling helpers used for cache addressing and token requests.

// std
use std::{collections::BTreeSet, slice::Iter};
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::_prelude::*;

/// Scopes every session requests regardless of caller input.
pub const DEFAULT_SCOPE: &str = "openid offline_access";

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized set of OAuth scopes.
///
/// Scopes are deduplicated and sorted on construction, so two sets built from the same tokens in
/// any order compare, hash, and serialize identically. The serialized form is the canonical
/// space-delimited string used inside cache keys.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
}
impl ScopeSet {
	/// Creates a normalized scope set from individual scope tokens.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			let owned: String = scope.into();

			if owned.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if owned.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
			}

			set.insert(owned);
		}

		Ok(Self::from_set(set))
	}

	/// Parses a space-delimited scope string, ignoring repeated or surrounding whitespace.
	///
	/// Never fails: an empty or whitespace-only input yields an empty set.
	pub fn from_delimited(raw: &str) -> Self {
		Self::from_set(raw.split_whitespace().map(str::to_owned).collect())
	}

	/// Merges several optional space-delimited scope strings into one normalized set.
	pub fn merged<'a, I>(parts: I) -> Self
	where
		I: IntoIterator<Item = Option<&'a str>>,
	{
		Self::from_set(
			parts.into_iter().flatten().flat_map(str::split_whitespace).map(str::to_owned).collect(),
		)
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Returns true when every scope in `other` is also present in `self`.
	pub fn is_superset_of(&self, other: &ScopeSet) -> bool {
		other.iter().all(|scope| self.contains(scope))
	}

	/// Returns the union of both sets.
	pub fn union(&self, other: &ScopeSet) -> ScopeSet {
		Self::from_set(self.iter().chain(other.iter()).map(str::to_owned).collect())
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(|s| s.as_str())
	}

	/// Returns the normalized string representation (space-delimited).
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}

	/// Returns the underlying slice of scope strings.
	pub fn as_slice(&self) -> &[String] {
		&self.scopes
	}

	fn from_set(set: BTreeSet<String>) -> Self {
		Self { scopes: Arc::from(set.into_iter().collect::<Vec<_>>()) }
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}

/// Iterator over scope strings.
pub struct ScopeIter<'a> {
	inner: Iter<'a, String>,
}
impl<'a> Iterator for ScopeIter<'a> {
	type Item = &'a str;

	fn next(&mut self) -> Option<Self::Item> {
		self.inner.next().map(|s| s.as_str())
	}
}
impl<'a> IntoIterator for &'a ScopeSet {
	type IntoIter = ScopeIter<'a>;
	type Item = &'a str;

	fn into_iter(self) -> Self::IntoIter {
		ScopeIter { inner: self.scopes.iter() }
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.normalized())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		if raw.chars().any(|c| c.is_whitespace() && c != ' ') {
			return Err(DeError::custom("scope strings must be space-delimited"));
		}

		Ok(ScopeSet::from_delimited(&raw))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_normalize_regardless_of_order() {
		let lhs = ScopeSet::new(["profile", "email", "email"])
			.expect("Left-hand scope set should be valid.");
		let rhs = ScopeSet::from_delimited("  email   profile ");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.normalized(), "email profile");
	}

	#[test]
	fn scopes_reject_whitespace_padding() {
		let err = ScopeSet::new([" profile "]).expect_err("Padded scopes must be rejected.");

		assert!(matches!(err, ScopeValidationError::ContainsWhitespace { .. }));
		assert!(ScopeSet::new([""]).is_err());
		assert!(ScopeSet::from_str("").is_ok(), "Empty string represents an empty scope set.");
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
		assert!(ScopeSet::from_delimited("   ").is_empty());
	}

	#[test]
	fn superset_matching_follows_set_semantics() {
		let stored = ScopeSet::from_delimited("openid offline_access extra");
		let requested = ScopeSet::from_delimited("offline_access openid");
		let narrow = ScopeSet::from_delimited("openid");

		assert!(stored.is_superset_of(&requested));
		assert!(requested.is_superset_of(&requested));
		assert!(!narrow.is_superset_of(&requested));
		assert!(narrow.is_superset_of(&ScopeSet::default()));
	}

	#[test]
	fn merged_deduplicates_and_skips_missing_parts() {
		let merged =
			ScopeSet::merged([Some(DEFAULT_SCOPE), None, Some("read:users openid"), Some("")]);

		assert_eq!(merged.normalized(), "offline_access openid read:users");
		assert_eq!(
			merged.union(&ScopeSet::from_delimited("write")).normalized(),
			"offline_access openid read:users write"
		);
	}

	#[test]
	fn serde_uses_canonical_string() {
		let scopes = ScopeSet::from_delimited("profile email");
		let json = serde_json::to_string(&scopes).expect("Scope set should serialize.");

		assert_eq!(json, "\"email profile\"");

		let parsed: ScopeSet =
			serde_json::from_str("\"profile email\"").expect("Scope set should deserialize.");

		assert_eq!(parsed, scopes);
		assert!(serde_json::from_str::<ScopeSet>("\"email\\tprofile\"").is_err());
	}
}
