//! Auth-domain identifiers, scope sets, cache entries, and decoded token projections.

pub mod id;
pub mod scope;
pub mod token;

pub use id::*;
pub use scope::*;
pub use token::{claims::*, entry::*, secret::*};
