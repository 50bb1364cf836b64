//! Transitions: the unit of change the sequencing oracle finalizes.
//!
//! A [`Transition`] consumes input revisions, reads reference revisions
//! without consuming them, and produces output records. Its
//! [`TransitionId`] is a SHA-256 over a domain-separated canonical encoding
//! and is what every party signs.
//!
//! ```text
//! Transition ──sign(owner)──▶ SignedTransition ──sign(bidder)──▶ oracle
//!                                                                  │
//!                                       FinalizedTransition ◀──────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    AuctionRecord, AuctionState, BidRecord, BidStatus, BookbuildError, LedgerRecord, PartyId,
    PartyKey, PartySignature, RecordRef, Result, StateAndRef, TransitionId, constants,
};

/// What a transition does. Contract rules are chosen by command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Genesis of new records (auction creation, bid submission).
    Issue,
    /// OPEN auction → SUCCESS/FAIL, owner-signed.
    CloseAuction,
    /// OPEN bid → ALLOTTED, owner- and bidder-signed.
    AllotBid,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issue => write!(f, "ISSUE"),
            Self::CloseAuction => write!(f, "CLOSE_AUCTION"),
            Self::AllotBid => write!(f, "ALLOT_BID"),
        }
    }
}

/// A proposed change to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub command: Command,
    /// Revisions consumed by this transition.
    pub inputs: Vec<RecordRef>,
    /// Revisions read but not consumed. They must still be current when the
    /// oracle sequences this transition.
    pub references: Vec<RecordRef>,
    pub outputs: Vec<LedgerRecord>,
    pub required_signers: Vec<PartyId>,
    /// The oracle rejects this transition after this instant.
    pub valid_until: DateTime<Utc>,
}

impl Transition {
    /// Content hash of this transition.
    ///
    /// `SHA-256(domain || command || inputs || references || outputs || signers || valid_until)`
    #[must_use]
    pub fn id(&self) -> TransitionId {
        let mut hasher = Sha256::new();
        hasher.update(constants::TRANSITION_DOMAIN);
        hasher.update([command_tag(self.command)]);
        put_refs(&mut hasher, &self.inputs);
        put_refs(&mut hasher, &self.references);
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            put_record(&mut hasher, output);
        }
        put_parties(&mut hasher, &self.required_signers);
        hasher.update(self.valid_until.timestamp_micros().to_le_bytes());

        let mut id = [0u8; 32];
        id.copy_from_slice(&hasher.finalize());
        TransitionId(id)
    }

    /// Address of the `index`-th output once this transition is finalized.
    #[must_use]
    pub fn output_ref(&self, index: u32) -> RecordRef {
        RecordRef::new(self.id(), index)
    }

    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.valid_until
    }

    /// Every party this transition names: signers first, then the
    /// participants of each output.
    #[must_use]
    pub fn parties(&self) -> Vec<PartyId> {
        let mut out: Vec<PartyId> = Vec::new();
        let named = self
            .required_signers
            .iter()
            .copied()
            .chain(self.outputs.iter().flat_map(LedgerRecord::participants));
        for party in named {
            if !out.contains(&party) {
                out.push(party);
            }
        }
        out
    }

    /// Sign this transition and wrap it.
    #[must_use]
    pub fn sign(self, key: &PartyKey) -> SignedTransition {
        SignedTransition::new(self).with_signature(key)
    }
}

/// A transition plus the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransition {
    pub transition: Transition,
    pub signatures: Vec<PartySignature>,
}

impl SignedTransition {
    #[must_use]
    pub fn new(transition: Transition) -> Self {
        Self {
            transition,
            signatures: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TransitionId {
        self.transition.id()
    }

    /// Add this party's signature over the transition id.
    #[must_use]
    pub fn with_signature(mut self, key: &PartyKey) -> Self {
        let sig = key.sign(self.id().as_bytes());
        self.signatures.retain(|s| s.by != sig.by);
        self.signatures.push(sig);
        self
    }

    /// Attach a signature produced elsewhere, after verifying it.
    ///
    /// # Errors
    /// - `SignatureInvalid` if it does not verify against this transition
    /// - `InvalidTransition` if the signer is not a required signer
    pub fn add_signature(&mut self, sig: PartySignature) -> Result<()> {
        if !self.transition.required_signers.contains(&sig.by) {
            return Err(BookbuildError::InvalidTransition {
                reason: format!("{} is not a required signer", sig.by),
            });
        }
        sig.verify(self.id().as_bytes())?;
        self.signatures.retain(|s| s.by != sig.by);
        self.signatures.push(sig);
        Ok(())
    }

    /// Required signers without a signature yet.
    #[must_use]
    pub fn missing_signers(&self) -> Vec<PartyId> {
        self.transition
            .required_signers
            .iter()
            .filter(|p| !self.signatures.iter().any(|s| s.by == **p))
            .copied()
            .collect()
    }

    /// Verify that every required signer has signed and that every
    /// signature present is valid.
    ///
    /// # Errors
    /// - `SignatureMissing` for the first required signer without a signature
    /// - `SignatureInvalid` for the first signature that does not verify
    pub fn verify_signatures(&self) -> Result<()> {
        if let Some(party) = self.missing_signers().first() {
            return Err(BookbuildError::SignatureMissing { party: *party });
        }
        let id = self.id();
        for sig in &self.signatures {
            sig.verify(id.as_bytes())?;
        }
        Ok(())
    }
}

/// A transition the oracle has sequenced. Its outputs are now the current
/// revisions of their records and its inputs are consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedTransition {
    pub signed: SignedTransition,
    /// Position in the oracle's total order.
    pub sequence: u64,
    pub finalized_at: DateTime<Utc>,
    /// Oracle signature over [`FinalizedTransition::finality_payload`].
    pub oracle_signature: PartySignature,
}

impl FinalizedTransition {
    #[must_use]
    pub fn id(&self) -> TransitionId {
        self.signed.id()
    }

    #[must_use]
    pub fn transition(&self) -> &Transition {
        &self.signed.transition
    }

    /// Bytes the oracle signs: `domain || tx_id || sequence`.
    #[must_use]
    pub fn finality_payload(id: &TransitionId, sequence: u64) -> Vec<u8> {
        let mut payload = Vec::with_capacity(64);
        payload.extend_from_slice(constants::FINALITY_DOMAIN);
        payload.extend_from_slice(id.as_bytes());
        payload.extend_from_slice(&sequence.to_le_bytes());
        payload
    }

    /// Check this was finalized by `oracle` and carries all required
    /// signatures.
    ///
    /// # Errors
    /// Returns a 3xx signature error if any check fails.
    pub fn verify(&self, oracle: PartyId) -> Result<()> {
        if self.oracle_signature.by != oracle {
            return Err(BookbuildError::SignatureInvalid {
                party: self.oracle_signature.by,
            });
        }
        self.oracle_signature
            .verify(&Self::finality_payload(&self.id(), self.sequence))?;
        self.signed.verify_signatures()
    }

    /// Output records with their new revision addresses.
    pub fn outputs(&self) -> impl Iterator<Item = (RecordRef, &LedgerRecord)> {
        let id = self.id();
        self.signed
            .transition
            .outputs
            .iter()
            .zip(0u32..)
            .map(move |(record, index)| (RecordRef::new(id, index), record))
    }

    /// The first auction output, if any.
    #[must_use]
    pub fn auction_output(&self) -> Option<StateAndRef<AuctionRecord>> {
        self.outputs().find_map(|(at, r)| {
            r.as_auction()
                .map(|a| StateAndRef::new(a.clone(), at))
        })
    }

    /// The first bid output, if any.
    #[must_use]
    pub fn bid_output(&self) -> Option<StateAndRef<BidRecord>> {
        self.outputs()
            .find_map(|(at, r)| r.as_bid().map(|b| StateAndRef::new(b.clone(), at)))
    }
}

// ---------------------------------------------------------------------------
// Canonical encoding
// ---------------------------------------------------------------------------

fn command_tag(command: Command) -> u8 {
    match command {
        Command::Issue => 0,
        Command::CloseAuction => 1,
        Command::AllotBid => 2,
    }
}

fn put_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn put_decimal(hasher: &mut Sha256, d: &Decimal) {
    put_bytes(hasher, d.to_string().as_bytes());
}

fn put_refs(hasher: &mut Sha256, refs: &[RecordRef]) {
    hasher.update((refs.len() as u64).to_le_bytes());
    for r in refs {
        hasher.update(r.tx.as_bytes());
        hasher.update(r.index.to_le_bytes());
    }
}

fn put_parties(hasher: &mut Sha256, parties: &[PartyId]) {
    hasher.update((parties.len() as u64).to_le_bytes());
    for p in parties {
        hasher.update(p.as_bytes());
    }
}

fn put_record(hasher: &mut Sha256, record: &LedgerRecord) {
    match record {
        LedgerRecord::Auction(a) => {
            hasher.update([0xA1u8]);
            hasher.update(a.id.0.as_bytes());
            put_bytes(hasher, a.item_name.as_bytes());
            put_bytes(hasher, a.item_description.as_bytes());
            put_decimal(hasher, &a.capital_target);
            hasher.update(a.expiry.timestamp_micros().to_le_bytes());
            hasher.update(a.owner.as_bytes());
            put_parties(hasher, &a.participants);
            hasher.update([u8::from(a.active)]);
            hasher.update([match a.state {
                AuctionState::Open => 0u8,
                AuctionState::Success => 1,
                AuctionState::Fail => 2,
            }]);
            match &a.allocation_root {
                Some(root) => {
                    hasher.update([1u8]);
                    hasher.update(root);
                }
                None => hasher.update([0u8]),
            }
        }
        LedgerRecord::Bid(b) => {
            hasher.update([0xB1u8]);
            hasher.update(b.id.0.as_bytes());
            hasher.update(b.auction.0.as_bytes());
            hasher.update(b.bidder.as_bytes());
            hasher.update(b.owner.as_bytes());
            put_decimal(hasher, &b.price);
            put_decimal(hasher, &b.quantity);
            hasher.update([match b.status {
                BidStatus::Open => 0u8,
                BidStatus::Allotted => 1,
                BidStatus::NotAllotted => 2,
            }]);
            match &b.clearing_price {
                Some(cp) => {
                    hasher.update([1u8]);
                    put_decimal(hasher, cp);
                }
                None => hasher.update([0u8]),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuctionRef, BidRef};

    fn owner() -> PartyKey {
        PartyKey::from_seed([1; 32])
    }

    fn bidder() -> PartyKey {
        PartyKey::from_seed([2; 32])
    }

    fn make_bid() -> BidRecord {
        BidRecord {
            id: BidRef::from_bytes([7; 16]),
            auction: AuctionRef::from_bytes([8; 16]),
            bidder: bidder().id(),
            owner: owner().id(),
            price: Decimal::new(10, 0),
            quantity: Decimal::new(5, 0),
            status: BidStatus::Open,
            clearing_price: None,
        }
    }

    fn make_tx() -> Transition {
        Transition {
            command: Command::AllotBid,
            inputs: vec![RecordRef::new(TransitionId([1; 32]), 0)],
            references: vec![RecordRef::new(TransitionId([2; 32]), 0)],
            outputs: vec![LedgerRecord::Bid(make_bid().allotted(Decimal::new(11, 0)).unwrap())],
            required_signers: vec![owner().id(), bidder().id()],
            valid_until: DateTime::from_timestamp(1_900_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn id_is_deterministic() {
        assert_eq!(make_tx().id(), make_tx().id());
    }

    #[test]
    fn id_covers_references() {
        let a = make_tx();
        let mut b = make_tx();
        b.references.clear();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn id_covers_clearing_price() {
        let a = make_tx();
        let mut b = make_tx();
        b.outputs = vec![LedgerRecord::Bid(make_bid().allotted(Decimal::new(12, 0)).unwrap())];
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn id_covers_validity_window() {
        let a = make_tx();
        let mut b = make_tx();
        b.valid_until += chrono::Duration::seconds(1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn fully_signed_transition_verifies() {
        let stx = make_tx().sign(&owner()).with_signature(&bidder());
        assert!(stx.missing_signers().is_empty());
        stx.verify_signatures().unwrap();
    }

    #[test]
    fn missing_signature_reported() {
        let stx = make_tx().sign(&owner());
        assert_eq!(stx.missing_signers(), vec![bidder().id()]);
        let err = stx.verify_signatures().unwrap_err();
        assert!(matches!(err, BookbuildError::SignatureMissing { party } if party == bidder().id()));
    }

    #[test]
    fn add_signature_rejects_outsider() {
        let mut stx = make_tx().sign(&owner());
        let outsider = PartyKey::from_seed([3; 32]);
        let sig = outsider.sign(stx.id().as_bytes());
        let err = stx.add_signature(sig).unwrap_err();
        assert!(matches!(err, BookbuildError::InvalidTransition { .. }));
    }

    #[test]
    fn add_signature_rejects_signature_over_other_tx() {
        let mut stx = make_tx().sign(&owner());
        let sig = bidder().sign(b"something else");
        assert!(stx.add_signature(sig).is_err());
        let good = bidder().sign(stx.id().as_bytes());
        stx.add_signature(good).unwrap();
        stx.verify_signatures().unwrap();
    }

    #[test]
    fn tampering_invalidates_signatures() {
        let mut stx = make_tx().sign(&owner()).with_signature(&bidder());
        stx.transition.inputs.push(RecordRef::new(TransitionId([9; 32]), 1));
        assert!(matches!(
            stx.verify_signatures().unwrap_err(),
            BookbuildError::SignatureInvalid { .. }
        ));
    }

    #[test]
    fn parties_dedupes_signers_and_participants() {
        let tx = make_tx();
        assert_eq!(tx.parties(), vec![owner().id(), bidder().id()]);
    }

    #[test]
    fn finalized_outputs_are_addressed_by_tx_id() {
        let oracle = PartyKey::from_seed([4; 32]);
        let stx = make_tx().sign(&owner()).with_signature(&bidder());
        let id = stx.id();
        let ftx = FinalizedTransition {
            oracle_signature: oracle.sign(&FinalizedTransition::finality_payload(&id, 7)),
            signed: stx,
            sequence: 7,
            finalized_at: Utc::now(),
        };
        ftx.verify(oracle.id()).unwrap();
        assert!(ftx.verify(owner().id()).is_err());

        let bid = ftx.bid_output().unwrap();
        assert_eq!(bid.at, RecordRef::new(id, 0));
        assert_eq!(bid.record.status, BidStatus::Allotted);
        assert!(ftx.auction_output().is_none());
    }

    #[test]
    fn validity_window() {
        let tx = make_tx();
        assert!(tx.is_valid_at(tx.valid_until));
        assert!(!tx.is_valid_at(tx.valid_until + chrono::Duration::milliseconds(1)));
    }
}
