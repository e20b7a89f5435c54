//! Strongly typed identifiers enforced across the client domain.
//!
//! Client identifiers end up in cookie names, lock names, and the tenant subdomain, so they are
//! restricted to printable ASCII; organization identifiers only need to be non-empty tokens.

// std
use std::borrow::Borrow;
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, ascii_only = $ascii_only:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view, $ascii_only)?;

				Ok(Self(view.to_owned()))
			}

			/// Borrows the identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value, $ascii_only)?;

				Ok(Self(value))
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (client, organization).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (client, organization).
		kind: &'static str,
	},
	/// The identifier contains characters outside printable ASCII.
	#[error("{kind} identifier must be printable ASCII.")]
	NonAscii {
		/// Kind of identifier (client, organization).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (client, organization).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! {
	ClientId,
	"OAuth client identifier issued by SlashAuth for an application.",
	"Client",
	ascii_only = true
}
def_id! {
	OrganizationId,
	"Organization identifier carried in the `org_id` ID token claim.",
	"Organization",
	ascii_only = false
}

fn validate_view(kind: &'static str, view: &str, ascii_only: bool) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if ascii_only && !view.chars().all(|c| c.is_ascii_graphic()) {
		return Err(IdentifierError::NonAscii { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_padding_and_empty_values() {
		assert!(ClientId::new(" client-123").is_err(), "Leading whitespace must be rejected.");
		assert!(ClientId::new("client-123 ").is_err(), "Trailing whitespace must be rejected.");

		let client = ClientId::new("client-123").expect("Client fixture should be valid.");

		assert_eq!(client.as_ref(), "client-123");
		assert!(OrganizationId::new("").is_err());
		assert!(OrganizationId::new("with space").is_err());
		assert!(matches!(ClientId::new("clïent"), Err(IdentifierError::NonAscii { .. })));
		assert!(OrganizationId::new("organisation-ï").is_ok());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let client: ClientId =
			serde_json::from_str("\"client-42\"").expect("Client should deserialize successfully.");

		assert_eq!(client.as_ref(), "client-42");
		assert!(serde_json::from_str::<ClientId>("\"with space\"").is_err());
		assert_eq!(format!("{client:?}"), "Client(client-42)");
	}

	#[test]
	fn length_limit_is_enforced() {
		let exact = "a".repeat(IDENTIFIER_MAX_LEN);

		ClientId::new(&exact).expect("Exact length should succeed.");

		let too_long = "a".repeat(IDENTIFIER_MAX_LEN + 1);

		assert!(matches!(
			ClientId::new(&too_long),
			Err(IdentifierError::TooLong { kind: "Client", max: IDENTIFIER_MAX_LEN })
		));
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ClientId, u8> = HashMap::from_iter([(
			ClientId::new("client-123").expect("Client used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("client-123"), Some(&7));
	}
}
