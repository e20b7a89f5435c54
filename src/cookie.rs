//! Session cookies: the authenticated marker, its legacy name, and the organization hint.

// self
use crate::_prelude::*;

/// Marker name used before cookies were scoped by client.
pub const LEGACY_AUTHENTICATED_COOKIE: &str = "slashauth.is.authenticated";

/// Attributes applied when a cookie is written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieOptions {
	/// Lifetime in days.
	pub days_until_expire: u32,
	/// Domain the cookie is visible from; `None` scopes it to the current host.
	pub cookie_domain: Option<String>,
}

/// Minimal cookie jar used for session markers.
pub trait CookieStore
where
	Self: Send + Sync,
{
	/// Reads a cookie value.
	fn get(&self, name: &str) -> Option<String>;

	/// Writes a cookie.
	fn save(&self, name: &str, value: &str, options: &CookieOptions);

	/// Deletes a cookie; missing cookies are ignored.
	fn remove(&self, name: &str);
}

/// Process-local cookie jar.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
	cookies: Mutex<HashMap<String, (String, CookieOptions)>>,
}
impl MemoryCookieStore {
	/// Attributes a cookie was last written with.
	pub fn options(&self, name: &str) -> Option<CookieOptions> {
		self.cookies.lock().get(name).map(|(_, options)| options.clone())
	}
}
impl CookieStore for MemoryCookieStore {
	fn get(&self, name: &str) -> Option<String> {
		self.cookies.lock().get(name).map(|(value, _)| value.clone())
	}

	fn save(&self, name: &str, value: &str, options: &CookieOptions) {
		self.cookies.lock().insert(name.to_owned(), (value.to_owned(), options.clone()));
	}

	fn remove(&self, name: &str) {
		self.cookies.lock().remove(name);
	}
}

/// Cookie names owned by one client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCookies {
	authenticated: String,
	organization_hint: String,
}
impl SessionCookies {
	/// Derives the cookie names for `client_id`.
	pub fn new(client_id: &str) -> Self {
		Self {
			authenticated: format!("slashauth.{client_id}.is.authenticated"),
			organization_hint: format!("slashauth.{client_id}.organization_hint"),
		}
	}

	/// Name of the authenticated marker.
	pub fn authenticated(&self) -> &str {
		&self.authenticated
	}

	/// Name of the organization hint cookie.
	pub fn organization_hint(&self) -> &str {
		&self.organization_hint
	}

	/// Sets the authenticated marker.
	pub fn mark_authenticated(&self, jar: &dyn CookieStore, options: &CookieOptions) {
		jar.save(&self.authenticated, "true", options);
	}

	/// Returns `true` when a previous login left a marker behind.
	///
	/// A marker under the legacy name is moved to the scoped name first.
	pub fn detect_session(&self, jar: &dyn CookieStore, options: &CookieOptions) -> bool {
		if jar.get(&self.authenticated).is_some() {
			return true;
		}
		if jar.get(LEGACY_AUTHENTICATED_COOKIE).is_none() {
			return false;
		}

		self.mark_authenticated(jar, options);
		jar.remove(LEGACY_AUTHENTICATED_COOKIE);

		true
	}

	/// Stores the organization hint, or removes it when the session has no organization.
	pub fn set_organization_hint(
		&self,
		jar: &dyn CookieStore,
		organization_id: Option<&str>,
		days_until_expire: u32,
	) {
		match organization_id {
			Some(id) => jar.save(
				&self.organization_hint,
				id,
				&CookieOptions { days_until_expire, cookie_domain: None },
			),
			None => jar.remove(&self.organization_hint),
		}
	}

	/// Removes every session cookie of the client.
	pub fn clear(&self, jar: &dyn CookieStore) {
		jar.remove(&self.organization_hint);
		jar.remove(&self.authenticated);
	}
}
