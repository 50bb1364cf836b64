//! Per-party record store.
//!
//! A vault holds the current revision of every record its party has seen
//! finalized. Recording a transition retires its inputs and makes its outputs
//! current. Bids are returned in the order their first revision was recorded.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bookbuild_types::{
    AuctionRecord, AuctionRef, BidRecord, BidRef, BidStatus, BookbuildError, FinalizedTransition,
    LedgerRecord, PartyId, RecordRef, RecordStore, Result, StateAndRef, TransitionId,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct VaultState {
    recorded: HashMap<TransitionId, FinalizedTransition>,
    /// Revisions consumed by some recorded transition.
    spent: HashSet<RecordRef>,
    auctions: HashMap<AuctionRef, StateAndRef<AuctionRecord>>,
    bids: HashMap<BidRef, StateAndRef<BidRecord>>,
    /// Bid ids per auction, first-recorded first.
    bid_order: HashMap<AuctionRef, Vec<BidRef>>,
}

impl VaultState {
    fn apply(&mut self, finalized: &FinalizedTransition) {
        self.spent.extend(finalized.transition().inputs.iter().copied());
        let spent = &self.spent;
        self.auctions.retain(|_, s| !spent.contains(&s.at));
        self.bids.retain(|_, s| !spent.contains(&s.at));

        for (at, record) in finalized.outputs() {
            // A successor recorded earlier already superseded this output.
            let superseded = self.spent.contains(&at);
            match record {
                LedgerRecord::Auction(a) => {
                    if !superseded {
                        self.auctions.insert(a.id, StateAndRef::new(a.clone(), at));
                    }
                }
                LedgerRecord::Bid(b) => {
                    let order = self.bid_order.entry(b.auction).or_default();
                    if !order.contains(&b.id) {
                        order.push(b.id);
                    }
                    if !superseded {
                        self.bids.insert(b.id, StateAndRef::new(b.clone(), at));
                    }
                }
            }
        }
    }

    fn bids_for(&self, auction: AuctionRef) -> impl Iterator<Item = &StateAndRef<BidRecord>> {
        self.bid_order
            .get(&auction)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bids.get(id))
    }
}

/// In-memory vault for one party.
pub struct InMemoryVault {
    owner: PartyId,
    state: RwLock<VaultState>,
}

impl InMemoryVault {
    #[must_use]
    pub fn new(owner: PartyId) -> Self {
        Self {
            owner,
            state: RwLock::new(VaultState::default()),
        }
    }

    #[must_use]
    pub fn owner(&self) -> PartyId {
        self.owner
    }

    pub async fn has_recorded(&self, tx: &TransitionId) -> bool {
        self.state.read().await.recorded.contains_key(tx)
    }

    /// Number of distinct transitions recorded.
    pub async fn recorded_count(&self) -> usize {
        self.state.read().await.recorded.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryVault {
    async fn auction(&self, auction: AuctionRef) -> Result<StateAndRef<AuctionRecord>> {
        self.state
            .read()
            .await
            .auctions
            .get(&auction)
            .cloned()
            .ok_or(BookbuildError::AuctionNotFound(auction))
    }

    async fn open_bids(&self, auction: AuctionRef) -> Result<Vec<StateAndRef<BidRecord>>> {
        let state = self.state.read().await;
        Ok(state
            .bids_for(auction)
            .filter(|s| s.record.status == BidStatus::Open)
            .cloned()
            .collect())
    }

    async fn bids(&self, auction: AuctionRef) -> Result<Vec<StateAndRef<BidRecord>>> {
        let state = self.state.read().await;
        Ok(state.bids_for(auction).cloned().collect())
    }

    async fn bid(&self, bid: BidRef) -> Result<StateAndRef<BidRecord>> {
        self.state
            .read()
            .await
            .bids
            .get(&bid)
            .cloned()
            .ok_or(BookbuildError::BidNotFound(bid))
    }

    async fn transaction(&self, id: TransitionId) -> Result<FinalizedTransition> {
        self.state
            .read()
            .await
            .recorded
            .get(&id)
            .cloned()
            .ok_or(BookbuildError::TransitionNotFound(id))
    }

    async fn record(&self, finalized: &FinalizedTransition) -> Result<()> {
        let id = finalized.id();
        let mut state = self.state.write().await;
        if state.recorded.contains_key(&id) {
            return Ok(());
        }
        state.recorded.insert(id, finalized.clone());
        state.apply(finalized);
        tracing::debug!(party = %self.owner, tx = %id, "Recorded transition");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bookbuild_types::{AuctionState, Command, PartyKey, SequencingOracle, Transition};
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::InMemoryNotary;

    struct Fixture {
        notary: InMemoryNotary,
        owner: PartyKey,
        bidder: PartyKey,
        vault: InMemoryVault,
        auction: AuctionRecord,
    }

    async fn fixture() -> Fixture {
        let owner = PartyKey::from_seed([1; 32]);
        let bidder = PartyKey::from_seed([2; 32]);
        let notary = InMemoryNotary::new(PartyKey::from_seed([9; 32]));
        let vault = InMemoryVault::new(owner.id());
        let auction = AuctionRecord::dummy(owner.id(), Decimal::new(100, 0), vec![]);
        let ftx = notary
            .issue(vec![LedgerRecord::Auction(auction.clone())], &owner)
            .await
            .unwrap();
        vault.record(&ftx).await.unwrap();
        Fixture {
            notary,
            owner,
            bidder,
            vault,
            auction,
        }
    }

    async fn submit(f: &Fixture, price: i64) -> BidRecord {
        let bid = BidRecord::dummy(
            f.auction.id,
            f.bidder.id(),
            f.owner.id(),
            Decimal::new(price, 0),
            Decimal::ONE,
        );
        let ftx = f
            .notary
            .issue(vec![LedgerRecord::Bid(bid.clone())], &f.bidder)
            .await
            .unwrap();
        f.vault.record(&ftx).await.unwrap();
        bid
    }

    #[tokio::test]
    async fn unknown_auction_not_found() {
        let f = fixture().await;
        let err = f.vault.auction(AuctionRef::new()).await.unwrap_err();
        assert!(matches!(err, BookbuildError::AuctionNotFound(_)));
        assert!(f.vault.bid(BidRef::new()).await.is_err());
    }

    #[tokio::test]
    async fn bids_keep_first_recorded_order() {
        let f = fixture().await;
        let a = submit(&f, 30).await;
        let b = submit(&f, 10).await;
        let c = submit(&f, 20).await;
        let ids: Vec<BidRef> = f
            .vault
            .open_bids(f.auction.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.record.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn successor_revision_replaces_input() {
        let f = fixture().await;
        let current = f.vault.auction(f.auction.id).await.unwrap();
        let close = Transition {
            command: Command::CloseAuction,
            inputs: vec![current.at],
            references: vec![],
            outputs: vec![LedgerRecord::Auction(
                current.record.closed(AuctionState::Success, [1; 32]).unwrap(),
            )],
            required_signers: vec![f.owner.id()],
            valid_until: Utc::now() + chrono::Duration::seconds(30),
        };
        let ftx = f.notary.finalize(close.sign(&f.owner)).await.unwrap();
        f.vault.record(&ftx).await.unwrap();

        let after = f.vault.auction(f.auction.id).await.unwrap();
        assert_eq!(after.record.state, AuctionState::Success);
        assert_eq!(after.at.tx, ftx.id());
    }

    #[tokio::test]
    async fn allotted_bid_leaves_open_set_but_keeps_position() {
        let f = fixture().await;
        let first = submit(&f, 10).await;
        let second = submit(&f, 12).await;
        let current = f.vault.bid(first.id).await.unwrap();
        let allot = Transition {
            command: Command::AllotBid,
            inputs: vec![current.at],
            references: vec![],
            outputs: vec![LedgerRecord::Bid(current.record.allotted(Decimal::TEN).unwrap())],
            required_signers: vec![f.owner.id(), f.bidder.id()],
            valid_until: Utc::now() + chrono::Duration::seconds(30),
        };
        let ftx = f
            .notary
            .finalize(allot.sign(&f.owner).with_signature(&f.bidder))
            .await
            .unwrap();
        f.vault.record(&ftx).await.unwrap();

        let open = f.vault.open_bids(f.auction.id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].record.id, second.id);

        let all: Vec<BidRef> = f
            .vault
            .bids(f.auction.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.record.id)
            .collect();
        assert_eq!(all, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn late_genesis_does_not_resurrect_consumed_revision() {
        let f = fixture().await;
        let bid = BidRecord::dummy(f.auction.id, f.bidder.id(), f.owner.id(), Decimal::TEN, Decimal::ONE);
        let issued = f
            .notary
            .issue(vec![LedgerRecord::Bid(bid.clone())], &f.bidder)
            .await
            .unwrap();
        let allot = Transition {
            command: Command::AllotBid,
            inputs: vec![issued.bid_output().unwrap().at],
            references: vec![],
            outputs: vec![LedgerRecord::Bid(bid.allotted(Decimal::TEN).unwrap())],
            required_signers: vec![f.owner.id(), f.bidder.id()],
            valid_until: Utc::now() + chrono::Duration::seconds(30),
        };
        let allotted = f
            .notary
            .finalize(allot.sign(&f.owner).with_signature(&f.bidder))
            .await
            .unwrap();

        let observer = InMemoryVault::new(PartyId([7; 32]));
        observer.record(&allotted).await.unwrap();
        observer.record(&issued).await.unwrap();
        let current = observer.bid(bid.id).await.unwrap();
        assert_eq!(current.record.status, BidStatus::Allotted);
        assert!(observer.open_bids(f.auction.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recording_twice_is_noop() {
        let f = fixture().await;
        let bid = BidRecord::dummy(f.auction.id, f.bidder.id(), f.owner.id(), Decimal::ONE, Decimal::ONE);
        let ftx = f
            .notary
            .issue(vec![LedgerRecord::Bid(bid)], &f.bidder)
            .await
            .unwrap();
        f.vault.record(&ftx).await.unwrap();
        f.vault.record(&ftx).await.unwrap();
        assert_eq!(f.vault.recorded_count().await, 2);
        assert!(f.vault.has_recorded(&ftx.id()).await);
        assert_eq!(f.vault.transaction(ftx.id()).await.unwrap(), ftx);
        assert_eq!(f.vault.bids(f.auction.id).await.unwrap().len(), 1);
        assert!(matches!(
            f.vault.transaction(TransitionId([0; 32])).await.unwrap_err(),
            BookbuildError::TransitionNotFound(_)
        ));
    }
}
