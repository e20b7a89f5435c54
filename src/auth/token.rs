//! Token material persisted by the cache: secrets, cache entries, and decoded ID tokens.

pub mod claims;
pub mod entry;
pub mod secret;
