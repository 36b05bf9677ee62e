//! Password Hashing
//! Mission: Turn plaintext passwords into salted bcrypt digests and check them

use crate::auth::models::PasswordHash;
use crate::config::AuthConfig;
use thiserror::Error;

/// Unrecoverable hashing error. Never carries the plaintext.
#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashingFailure(#[from] bcrypt::BcryptError);

/// Hash and verify credential proofs.
pub trait CredentialVerifier: Send + Sync {
    /// Salted one-way hash; two calls on the same input yield different output.
    fn hash(&self, plaintext: &str) -> Result<PasswordHash, HashingFailure>;

    /// `Ok(false)` on mismatch; `Err` only when `hash` is structurally invalid.
    fn verify(&self, plaintext: &str, hash: &PasswordHash) -> Result<bool, HashingFailure>;
}

/// bcrypt with a configured work factor
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.bcrypt_cost)
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl CredentialVerifier for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<PasswordHash, HashingFailure> {
        let digest = bcrypt::hash(plaintext, self.cost)?;
        Ok(PasswordHash::new(digest))
    }

    fn verify(&self, plaintext: &str, hash: &PasswordHash) -> Result<bool, HashingFailure> {
        Ok(bcrypt::verify(plaintext, hash.as_str())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> BcryptHasher {
        BcryptHasher::new(4)
    }

    #[test]
    fn test_hash_then_verify() {
        let h = hasher();
        let digest = h.hash("longenough1").unwrap();
        assert!(!digest.is_empty());
        assert!(h.verify("longenough1", &digest).unwrap());
        assert!(!h.verify("longenough2", &digest).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let h = hasher();
        let first = h.hash("same-password").unwrap();
        let second = h.hash("same-password").unwrap();

        assert_ne!(first, second);
        assert!(h.verify("same-password", &first).unwrap());
        assert!(h.verify("same-password", &second).unwrap());
    }

    #[test]
    fn test_embedded_cost_is_used() {
        // A digest made at one cost still verifies with a hasher configured for another.
        let digest = BcryptHasher::new(5).hash("pw-pw-pw-pw").unwrap();
        assert!(digest.as_str().starts_with("$2b$05$"));
        assert!(hasher().verify("pw-pw-pw-pw", &digest).unwrap());
    }

    #[test]
    fn test_empty_and_unicode_inputs_hash() {
        let h = hasher();
        for input in ["", "pässwörd✓", "with spaces and\ttabs"] {
            let digest = h.hash(input).unwrap();
            assert!(h.verify(input, &digest).unwrap());
        }
    }

    #[test]
    fn test_malformed_hash_is_error_not_false() {
        let h = hasher();
        let bogus = PasswordHash::new("not-a-bcrypt-hash".to_string());
        assert!(h.verify("anything", &bogus).is_err());
    }
}
