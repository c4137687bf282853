#![forbid(unsafe_code)]

//! Keyed blob identifiers.
//!
//! Every blob stored by depot is addressed by the HMAC-SHA256 of its bytes
//! under a server-side secret. The secret keying means an attacker who can
//! upload blobs cannot grind for colliding identifiers, and two deployments
//! with different secrets produce disjoint id spaces for identical content.

mod id;
mod keyed;

pub use id::{BlobId, ID_SIZE, IdParseError};
pub use keyed::{BlobHasher, HashBuilder};
