//! Signatures over wire messages
//!
//! Verification is a collaborator seam (`SignatureScheme`); the default is
//! Ed25519, where an entity's `Id` is its verifying key.

use crate::errors::{LedgerError, Result};
use crate::id::Id;
use crate::params::SIGNATURE_SIZE;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;

/// A detached signature
pub type SignatureBytes = [u8; SIGNATURE_SIZE];

/// Signature verification
pub trait SignatureScheme: Send + Sync + fmt::Debug {
    /// Whether `signature` is valid for `message` under `key`
    fn verify(&self, key: &Id, message: &[u8], signature: &SignatureBytes) -> bool;
}

/// Ed25519 verification
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Scheme;

impl SignatureScheme for Ed25519Scheme {
    fn verify(&self, key: &Id, message: &[u8], signature: &SignatureBytes) -> bool {
        let Ok(verifying) = VerifyingKey::from_bytes(key.as_bytes()) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(signature);
        verifying.verify(message, &signature).is_ok()
    }
}

/// Accepts every signature. Only for simulations that skip crypto.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncheckedScheme;

impl SignatureScheme for UncheckedScheme {
    fn verify(&self, _key: &Id, _message: &[u8], _signature: &SignatureBytes) -> bool {
        true
    }
}

/// Secret signing identity of a computor or user
pub struct SigningIdentity {
    key: SigningKey,
    id: Id,
}

impl SigningIdentity {
    /// Derive the identity from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let id = Id(key.verifying_key().to_bytes());
        Self { key, id }
    }

    /// Parse a hex-encoded seed
    pub fn from_hex_seed(seed: &str) -> Result<Self> {
        let bytes = hex::decode(seed).map_err(|e| LedgerError::key_material(format!("bad seed hex: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LedgerError::key_material("seed must be 32 bytes"))?;
        Ok(Self::from_seed(seed))
    }

    /// Public identity
    pub fn id(&self) -> Id {
        self.id
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        self.key.sign(message).to_bytes()
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn identity(seed: u64) -> SigningIdentity {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        SigningIdentity::from_seed(bytes)
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = identity(1);
        let signature = signer.sign(b"tick 42");
        assert!(Ed25519Scheme.verify(&signer.id(), b"tick 42", &signature));
        assert!(!Ed25519Scheme.verify(&signer.id(), b"tick 43", &signature));
        assert!(!Ed25519Scheme.verify(&identity(2).id(), b"tick 42", &signature));
    }

    #[test]
    fn test_seed_is_deterministic() {
        assert_eq!(identity(7).id(), identity(7).id());
        let hex_seed = hex::encode([9u8; 32]);
        let parsed = SigningIdentity::from_hex_seed(&hex_seed).unwrap();
        assert_eq!(parsed.id(), SigningIdentity::from_seed([9u8; 32]).id());
        assert!(SigningIdentity::from_hex_seed("00").is_err());
    }
}
