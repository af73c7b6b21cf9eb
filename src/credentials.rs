//! Device passwords.
//!
//! A [`Password`] is the plaintext a caller submitted; it is only ever
//! turned into a [`PasswordDigest`] (an argon2id PHC string with its own
//! random salt) before anything is written. Hashing and verification
//! are CPU-bound, so both run on the blocking thread pool.

use std::fmt;

use argon2::password_hash::{
    self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::errors::{BackendError, ValidationError};

/// A plaintext password. Never printed.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(plaintext: impl Into<String>) -> Self {
        Password(plaintext.into())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Err(ValidationError::EmptyPassword)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

/// A stored password hash in PHC string format.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Wraps a digest read back from the database.
    pub fn from_stored(digest: String) -> Self {
        PasswordDigest(digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The fixed argon2 cost used for every new digest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        HashCost {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    fn hasher(&self) -> Result<Argon2<'static>, BackendError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| BackendError::PasswordHashing { source: e.into() })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hashes `password` with a fresh salt.
pub async fn hash_password(
    password: Password,
    cost: HashCost,
) -> Result<PasswordDigest, BackendError> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let hash = cost
            .hasher()?
            .hash_password(password.0.as_bytes(), &salt)
            .map_err(|source| BackendError::PasswordHashing { source })?;

        Ok(PasswordDigest(hash.to_string()))
    })
    .await
    .map_err(BackendError::BlockingTaskFailed)?
}

/// Checks `candidate` against `digest`. A mismatch is `Ok(false)`; only
/// a digest that can't be parsed or a failed task is an error.
pub async fn verify_password(
    candidate: Password,
    digest: PasswordDigest,
) -> Result<bool, BackendError> {
    task::spawn_blocking(move || {
        let parsed = PasswordHash::new(digest.as_str())
            .map_err(|source| BackendError::PasswordHashing { source })?;

        // the parameters come from the digest itself
        match Argon2::default().verify_password(candidate.0.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(source) => Err(BackendError::PasswordHashing { source }),
        }
    })
    .await
    .map_err(BackendError::BlockingTaskFailed)?
}

#[cfg(test)]
pub(crate) const TEST_COST: HashCost = HashCost {
    memory_kib: 64,
    iterations: 1,
    parallelism: 1,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn digest_never_equals_plaintext() {
        let digest = hash_password(Password::new("hunter2"), TEST_COST)
            .await
            .unwrap();

        assert_ne!(digest.as_str(), "hunter2");
        assert!(digest.as_str().starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn correct_password_verifies() {
        let digest = hash_password(Password::new("hunter2"), TEST_COST)
            .await
            .unwrap();

        assert!(verify_password(Password::new("hunter2"), digest).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_password_does_not_verify() {
        let digest = hash_password(Password::new("hunter2"), TEST_COST)
            .await
            .unwrap();

        for wrong in &["hunter3", "", "Hunter2", "hunter2 "] {
            assert!(
                !verify_password(Password::new(*wrong), digest.clone())
                    .await
                    .unwrap(),
                "{:?} must not verify",
                wrong
            );
        }
    }

    #[tokio::test]
    async fn salts_differ_between_digests() {
        let first = hash_password(Password::new("same"), TEST_COST).await.unwrap();
        let second = hash_password(Password::new("same"), TEST_COST).await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn garbage_digest_is_an_error() {
        let result = verify_password(
            Password::new("hunter2"),
            PasswordDigest::from_stored("not a digest".to_owned()),
        )
        .await;

        assert!(matches!(result, Err(BackendError::PasswordHashing { .. })));
    }

    #[test]
    fn debug_output_hides_plaintext() {
        assert_eq!(format!("{:?}", Password::new("hunter2")), "Password(..)");
    }
}
