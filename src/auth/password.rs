//! Password hashing and verification using Argon2id
//!
//! The cost parameters are fixed for the life of the process; digests are stored
//! in PHC format so they carry their own salt and parameters.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::warn;

/// Memory cost in KiB.
pub const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;
/// Number of passes.
pub const DEFAULT_ITERATIONS: u32 = 2;

#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    // Compared against when the account does not exist, so that path costs the same.
    decoy: String,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("params", self.argon2.params())
            .finish_non_exhaustive()
    }
}

impl PasswordHasher {
    /// Hasher with the default cost.
    ///
    /// # Errors
    /// Returns an error if the parameters are rejected by Argon2.
    pub fn new() -> Result<Self> {
        Self::with_cost(DEFAULT_MEMORY_KIB, DEFAULT_ITERATIONS)
    }

    /// Hasher with an explicit cost; lower values are only meant for tests.
    ///
    /// # Errors
    /// Returns an error if the parameters are rejected by Argon2.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy = hash_with(&argon2, "decoy-password")?;

        Ok(Self { argon2, decoy })
    }

    /// Hash a plaintext password into a PHC string with a fresh salt.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        hash_with(&self.argon2, plaintext)
    }

    /// Compare a plaintext password against a stored digest.
    ///
    /// A digest that cannot be parsed compares as `false`.
    #[must_use]
    pub fn compare(&self, plaintext: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("stored password digest is not a PHC string: {err}");
                return false;
            }
        };

        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spend the same work as a real comparison; the result is discarded.
    pub fn compare_decoy(&self, plaintext: &str) {
        let _ = self.compare(plaintext, &self.decoy);
    }
}

fn hash_with(argon2: &Argon2<'static>, plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}
