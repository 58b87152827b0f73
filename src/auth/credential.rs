//! The single operator credential, stored as an Argon2id PHC string.

use super::store;
use super::AuthError;
use crate::config::HashingConfig;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::path::{Path, PathBuf};

pub struct CredentialStore {
    path: PathBuf,
    params: Params,
}

impl CredentialStore {
    pub fn new(path: &Path, hashing: &HashingConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            hashing.memory_kib,
            hashing.iterations,
            hashing.parallelism,
            None,
        )
        .map_err(|e| AuthError::Hashing(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            params,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if a credential has been persisted, readable or not.
    ///
    /// An unreadable or corrupt record still counts as present so that damage to
    /// the file never drops the console back into first-run setup.
    pub fn exists(&self) -> bool {
        self.path.try_exists().unwrap_or(true)
    }

    /// Hash `plaintext` with a fresh salt and atomically replace the stored credential
    pub fn set(&self, plaintext: &str) -> Result<(), AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();

        store::write_atomic(&self.path, hash.as_bytes())?;
        tracing::debug!("credential written to {}", self.path().display());
        Ok(())
    }

    /// The stored hash, distinguishing a corrupt record from a missing one
    pub fn stored_hash(&self) -> Result<Option<String>, AuthError> {
        let Some(stored) = store::read_text(&self.path)?.strict(&self.path)? else {
            return Ok(None);
        };
        let stored = stored.trim().to_string();
        if let Err(e) = PasswordHash::new(&stored) {
            return Err(AuthError::MalformedState {
                path: self.path.clone(),
                reason: e.to_string(),
            });
        }
        Ok(Some(stored))
    }

    /// Constant-time check of `plaintext` against the stored hash.
    ///
    /// Missing, unreadable or malformed records never match.
    pub fn verify(&self, plaintext: &str) -> bool {
        let stored = match self.stored_hash() {
            Ok(Some(stored)) => stored,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!("credential cannot be checked: {}", e);
                return false;
            }
        };
        let Ok(parsed) = PasswordHash::new(&stored) else {
            return false;
        };

        // Parameters come from the PHC string, so hashes made under an older
        // work factor still verify.
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

#[cfg(test)]
pub(crate) fn cheap_hashing() -> HashingConfig {
    HashingConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}
