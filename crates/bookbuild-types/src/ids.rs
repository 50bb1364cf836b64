//! Identifiers used throughout bookbuild.
//!
//! Record identities ([`AuctionRef`], [`BidRef`]) use UUIDv7 and stay stable
//! across revisions. Party identities are raw ed25519 public keys. A
//! [`RecordRef`] addresses one immutable revision of a record.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AuctionRef
// ---------------------------------------------------------------------------

/// Stable reference of an auction, immutable across revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AuctionRef(pub Uuid);

impl AuctionRef {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for AuctionRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auction:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BidRef
// ---------------------------------------------------------------------------

/// Stable reference of a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BidRef(pub Uuid);

impl BidRef {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for BidRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BidRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bid:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PartyId
// ---------------------------------------------------------------------------

/// Identity of a ledger party (owner, bidder, observer or notary).
/// This is the raw ed25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PartyId(pub [u8; 32]);

impl PartyId {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "party:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// TransitionId
// ---------------------------------------------------------------------------

/// Content hash of a transition (SHA-256 over its canonical encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TransitionId(pub [u8; 32]);

impl TransitionId {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// RecordRef
// ---------------------------------------------------------------------------

/// Address of one revision of a record: the transition that produced it and
/// the position among that transition's outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RecordRef {
    pub tx: TransitionId,
    pub index: u32,
}

impl RecordRef {
    #[must_use]
    pub fn new(tx: TransitionId, index: u32) -> Self {
        Self { tx, index }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", hex::encode(&self.tx.0[..8]), self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auction_ref_uniqueness() {
        assert_ne!(AuctionRef::new(), AuctionRef::new());
    }

    #[test]
    fn bid_ref_ordering_follows_creation() {
        let a = BidRef::new();
        let b = BidRef::new();
        assert!(a < b);
    }

    #[test]
    fn party_display_is_prefixed_hex() {
        let party = PartyId([0xAB; 32]);
        assert_eq!(format!("{party}"), "party:abababababababab");
    }

    #[test]
    fn record_ref_display() {
        let r = RecordRef::new(TransitionId([1; 32]), 3);
        assert_eq!(format!("{r}"), "0101010101010101(3)");
    }

    #[test]
    fn serde_roundtrips() {
        let id = AuctionRef::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: AuctionRef = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        let r = RecordRef::new(TransitionId([7; 32]), 0);
        let json = serde_json::to_string(&r).unwrap();
        let back: RecordRef = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
