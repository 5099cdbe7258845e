//! Secret hashing and verification.
//!
//! Secrets are hashed with Argon2id and stored as PHC strings
//! (`$argon2id$v=19$m=...,t=...,p=...$<salt>$<hash>`), so every stored hash
//! carries its own salt and cost parameters.

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Opaque output of a [`SecretHasher`].
///
/// `Debug` is redacted so a stored hash never ends up in logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretHash(String);

impl SecretHash {
    /// Wrap a hash loaded from storage. No validation happens here; a
    /// malformed value surfaces as [`CorruptCredential`] on verification.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw encoded form, for persisting.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretHash(<redacted>)")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("invalid hasher parameters: {0}")]
    InvalidParameters(String),

    #[error("hashing failed: {0}")]
    Hashing(String),
}

/// The stored hash could not be read (wrong format, unknown algorithm or
/// version). This is a data problem, not a wrong secret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("corrupt credential: {0}")]
pub struct CorruptCredential(pub String);

/// One-way, salted secret hashing.
///
/// Implementations hold no mutable state and may be called concurrently.
pub trait SecretHasher: Send + Sync {
    /// Hash `plaintext` with a fresh salt.
    fn hash(&self, plaintext: &str) -> Result<SecretHash, HashError>;

    /// Check `plaintext` against a stored hash using the salt and parameters
    /// embedded in it. Fails closed: an unreadable hash is an error, never a
    /// match.
    fn verify(&self, plaintext: &str, stored: &SecretHash) -> Result<bool, CorruptCredential>;
}

impl<H> SecretHasher for Arc<H>
where
    H: SecretHasher + ?Sized,
{
    fn hash(&self, plaintext: &str) -> Result<SecretHash, HashError> {
        (**self).hash(plaintext)
    }

    fn verify(&self, plaintext: &str, stored: &SecretHash) -> Result<bool, CorruptCredential> {
        (**self).verify(plaintext, stored)
    }
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasherConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl HasherConfig {
    /// Cheapest parameters Argon2 accepts. Only for tests and local tooling.
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Argon2id hasher with an optional server-side pepper.
///
/// The pepper is mixed in as Argon2's secret input; hashes created with a
/// pepper only verify with the same pepper.
#[derive(Clone)]
pub struct Argon2SecretHasher {
    params: Params,
    pepper: Option<Vec<u8>>,
}

impl Argon2SecretHasher {
    pub fn new(config: HasherConfig) -> Result<Self, HashError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| HashError::InvalidParameters(e.to_string()))?;
        Ok(Self { params, pepper: None })
    }

    pub fn with_pepper(config: HasherConfig, pepper: impl Into<Vec<u8>>) -> Result<Self, HashError> {
        let mut hasher = Self::new(config)?;
        hasher.pepper = Some(pepper.into());
        // Surface an unusable pepper now rather than on the first login.
        hasher
            .argon2()
            .map_err(|e| HashError::InvalidParameters(e.to_string()))?;
        Ok(hasher)
    }

    fn argon2(&self) -> Result<Argon2<'_>, argon2::Error> {
        match &self.pepper {
            Some(pepper) => Argon2::new_with_secret(
                pepper,
                Algorithm::Argon2id,
                Version::V0x13,
                self.params.clone(),
            ),
            None => Ok(Argon2::new(
                Algorithm::Argon2id,
                Version::V0x13,
                self.params.clone(),
            )),
        }
    }
}

impl Default for Argon2SecretHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
            pepper: None,
        }
    }
}

impl core::fmt::Debug for Argon2SecretHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Argon2SecretHasher")
            .field("params", &self.params)
            .field("peppered", &self.pepper.is_some())
            .finish()
    }
}

impl SecretHasher for Argon2SecretHasher {
    fn hash(&self, plaintext: &str) -> Result<SecretHash, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = self
            .argon2()
            .map_err(|e| HashError::InvalidParameters(e.to_string()))?;

        let hash = argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| HashError::Hashing(e.to_string()))?;

        Ok(SecretHash(hash.to_string()))
    }

    fn verify(&self, plaintext: &str, stored: &SecretHash) -> Result<bool, CorruptCredential> {
        let parsed = PasswordHash::new(stored.expose())
            .map_err(|e| CorruptCredential(format!("unparseable hash: {e}")))?;

        let argon2 = self
            .argon2()
            .map_err(|e| CorruptCredential(format!("hasher unusable: {e}")))?;

        // Argon2 compares the recomputed output in constant time.
        match argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CorruptCredential(e.to_string())),
        }
    }
}
