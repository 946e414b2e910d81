//! Ingest API-key check.
//!
//! Keys are compared by SHA-256 digest equality: both sides hash to a fixed
//! 32-byte value first, so comparison time does not depend on how much of the
//! presented key matches.

use sha2::{Digest, Sha256};

pub fn api_key_matches(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}
