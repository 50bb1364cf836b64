//! Party keys, signatures and the identity directory.
//!
//! Every party signs with an ed25519 key; its [`PartyId`] is the public key.
//! Signatures always cover a [`TransitionId`] (or, for the oracle, a
//! domain-separated finality payload derived from one).

use std::{collections::HashMap, fmt};

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{BookbuildError, PartyId, Result};

/// A party's signing key.
#[derive(Clone)]
pub struct PartyKey {
    signing: SigningKey,
}

impl PartyKey {
    /// Generate a fresh key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Deterministic key from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    #[must_use]
    pub fn id(&self) -> PartyId {
        PartyId(self.signing.verifying_key().to_bytes())
    }

    /// Sign arbitrary bytes, attributing the signature to this party.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> PartySignature {
        PartySignature {
            by: self.id(),
            bytes: self.signing.sign(message).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartyKey").field("id", &self.id()).finish()
    }
}

/// An ed25519 signature attributed to a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySignature {
    pub by: PartyId,
    pub bytes: Vec<u8>,
}

impl PartySignature {
    /// Verify this signature over `message` against the signer's public key.
    ///
    /// # Errors
    /// Returns [`BookbuildError::SignatureInvalid`] if the key or signature
    /// is malformed or the signature does not verify.
    pub fn verify(&self, message: &[u8]) -> Result<()> {
        let invalid = || BookbuildError::SignatureInvalid { party: self.by };
        let key = VerifyingKey::from_bytes(self.by.as_bytes()).map_err(|_| invalid())?;
        let signature = Signature::from_slice(&self.bytes).map_err(|_| invalid())?;
        key.verify_strict(message, &signature).map_err(|_| invalid())
    }
}

/// A resolvable party: its key and a human readable legal name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyIdentity {
    pub id: PartyId,
    pub name: String,
}

impl PartyIdentity {
    #[must_use]
    pub fn new(id: PartyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Known party identities. Resolution itself is an external concern; this is
/// the local view a node sends along when a counterparty needs to validate
/// the parties of a transition.
#[derive(Debug, Clone, Default)]
pub struct PartyDirectory {
    parties: HashMap<PartyId, PartyIdentity>,
}

impl PartyDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: PartyIdentity) {
        self.parties.insert(identity.id, identity);
    }

    /// Identities for `parties`, in the given order, skipping unknown ones.
    #[must_use]
    pub fn identities_for(&self, parties: &[PartyId]) -> Vec<PartyIdentity> {
        parties
            .iter()
            .filter_map(|p| self.parties.get(p).cloned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}

impl FromIterator<PartyIdentity> for PartyDirectory {
    fn from_iter<I: IntoIterator<Item = PartyIdentity>>(iter: I) -> Self {
        let mut directory = Self::new();
        for identity in iter {
            directory.insert(identity);
        }
        directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_keys_are_deterministic() {
        let a = PartyKey::from_seed([9; 32]);
        let b = PartyKey::from_seed([9; 32]);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), PartyKey::from_seed([8; 32]).id());
    }

    #[test]
    fn signature_verifies() {
        let key = PartyKey::generate();
        let sig = key.sign(b"payload");
        assert_eq!(sig.by, key.id());
        sig.verify(b"payload").unwrap();
    }

    #[test]
    fn signature_over_other_message_rejected() {
        let key = PartyKey::from_seed([1; 32]);
        let sig = key.sign(b"payload");
        let err = sig.verify(b"other").unwrap_err();
        assert!(matches!(err, BookbuildError::SignatureInvalid { party } if party == key.id()));
    }

    #[test]
    fn forged_attribution_rejected() {
        let key = PartyKey::from_seed([1; 32]);
        let mut sig = key.sign(b"payload");
        sig.by = PartyKey::from_seed([2; 32]).id();
        assert!(sig.verify(b"payload").is_err());
    }

    #[test]
    fn truncated_signature_rejected() {
        let key = PartyKey::from_seed([1; 32]);
        let mut sig = key.sign(b"payload");
        sig.bytes.truncate(10);
        assert!(sig.verify(b"payload").is_err());
    }

    #[test]
    fn directory_returns_known_identities_in_order() {
        let alice = PartyKey::from_seed([1; 32]).id();
        let bob = PartyKey::from_seed([2; 32]).id();
        let carol = PartyKey::from_seed([3; 32]).id();
        let dir: PartyDirectory = [
            PartyIdentity::new(alice, "Alice"),
            PartyIdentity::new(bob, "Bob"),
        ]
        .into_iter()
        .collect();

        assert_eq!(dir.len(), 2);
        let found = dir.identities_for(&[bob, carol, alice]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, bob);
        assert_eq!(found[1].id, alice);
    }

    #[test]
    fn debug_does_not_print_secret() {
        let key = PartyKey::from_seed([5; 32]);
        let s = format!("{key:?}");
        assert!(s.starts_with("PartyKey"));
        assert!(!s.contains("signing"));
    }
}
