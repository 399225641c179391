//! # Password Hashing
//!
//! The credential store behind [`crate::auth::AuthService`] and
//! `UserService::change_password`. The hasher is an injected seam so a
//! deployment can swap in a slower KDF without touching the services.
//!
//! Stored format: `salt$hex-digest`, one `$` separator, salt first.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hashes and verifies passwords. Implementations must be deterministic
/// for `verify` given the stored string, but `hash` salts freshly on
/// every call, so hashing the same password twice yields different rows.
pub trait PasswordHasher: Send + Sync {
    /// Produces the stored credential string for a new password.
    fn hash(&self, password: &str) -> String;

    /// Checks a presented password against a stored credential string.
    /// Malformed stored strings verify as `false`, never panic.
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Salted SHA-256, the default implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = salted_digest(&salt, password);
        format!("{}${}", salt, digest)
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        match stored.split_once('$') {
            Some((salt, expected)) => salted_digest(salt, password) == expected,
            None => false,
        }
    }
}

/// Lowercase hex of SHA-256(salt || password).
fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

// =============================================================================
// Unit Tests
// =============================================================================
