//! Settlement orchestrator.
//!
//! Drives one auction from expiry to a [`SettlementReport`]: close it, then
//! fan out one commit job per allotted bid. Only a closure that cannot be
//! finalized aborts settlement; bid jobs fail one at a time.

use std::collections::HashMap;

use bookbuild_allocation::allocate;
use bookbuild_types::{
    AllocationOutcome, AuctionRecord, AuctionRef, BidRef, BidResult, BidSettlement, BidStatus,
    BookbuildError, CapitalTarget, Command, FinalizedTransition, PartyId, PartyKey, Result,
    SettlementConfig, SettlementReport, StateAndRef, TransitionId,
};
use chrono::Utc;
use tracing::Instrument;

use crate::{
    AuctionClosing, ClosedAuction, Collaborators, ConsideredBid, CommitCoordinator, contract,
    coordinator::{bounded, deadline},
};

/// Settles auctions on behalf of their owner.
pub struct SettlementOrchestrator {
    key: PartyKey,
    ports: Collaborators,
    config: SettlementConfig,
    coordinator: CommitCoordinator,
}

impl SettlementOrchestrator {
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(key: PartyKey, ports: Collaborators, config: SettlementConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            coordinator: CommitCoordinator::new(key.clone(), ports.clone(), config.clone()),
            key,
            ports,
            config,
        })
    }

    #[must_use]
    pub fn party(&self) -> PartyId {
        self.key.id()
    }

    #[must_use]
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Settle an auction whose expiry has passed.
    ///
    /// # Errors
    /// `AuctionNotExpired` before the expiry instant, otherwise any error
    /// from [`Self::close`]. Bid failures are in the report.
    pub async fn settle(&self, auction: AuctionRef) -> Result<SettlementReport> {
        self.run(auction, true).await
    }

    /// Settle an auction regardless of its expiry.
    ///
    /// # Errors
    /// As [`Self::close`].
    pub async fn settle_now(&self, auction: AuctionRef) -> Result<SettlementReport> {
        self.run(auction, false).await
    }

    async fn run(&self, auction: AuctionRef, enforce_expiry: bool) -> Result<SettlementReport> {
        let span = tracing::info_span!("settle_auction", %auction, owner = %self.key.id());
        async {
            let closed = self.close(auction, enforce_expiry).await?;
            let bids = self.settle_bids(&closed).await;
            let report = report(&closed, bids);
            tracing::info!(
                state = %report.state,
                allotted = report.allotted(),
                failed = report.failed(),
                "Settlement finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Allocate over the auction's OPEN bids and finalize the closure.
    ///
    /// Once the oracle has finalized the closure it stands: recording it
    /// locally and notifying observers are best effort. If the auction
    /// revision turns out to be consumed by a closure finalized earlier, that
    /// closure is recovered from the oracle instead.
    ///
    /// # Errors
    /// - `NotAuctionOwner`, `AuctionStateMismatch`, `AuctionNotExpired`
    /// - `InputConsumed` if the revision was consumed by anything but a closure
    /// - `AllocationDiverged` if a recovered closure saw a different bid set
    /// - any store, oracle or timeout error before finality
    pub async fn close(&self, auction: AuctionRef, enforce_expiry: bool) -> Result<ClosedAuction> {
        let current = self.ports.store.auction(auction).await?;
        let closing = AuctionClosing::begin(current, self.key.id())?;
        if enforce_expiry {
            closing.ensure_expired(Utc::now())?;
        }
        let audience = closing.current().record.audience();

        let open = self.ports.store.open_bids(auction).await?;
        let considered = open
            .iter()
            .map(|s| ConsideredBid {
                bid: s.record.id,
                bidder: s.record.bidder,
            })
            .collect();
        let outcome = allocate(open.iter().map(|s| &s.record), closing.target());
        tracing::info!(
            bids = open.len(),
            success = outcome.success,
            total_available = %outcome.total_available,
            total_raised = %outcome.total_raised,
            "Allocation computed"
        );

        let proposal = closing.propose(&outcome, deadline(self.config.validity_window)?)?;
        contract::verify_close(&proposal, closing.current())?;
        let submitted = bounded(
            self.config.finalize_timeout,
            "finalize closure",
            self.ports.oracle.finalize(proposal.sign(&self.key)),
        )
        .await;
        let closed = match submitted {
            Ok(finalized) => {
                finalized.verify(self.ports.oracle.identity())?;
                let closed = closing.complete(finalized, outcome, considered)?;
                self.persist(&closed.finalized).await;
                closed
            }
            Err(BookbuildError::InputConsumed {
                record,
                consumed_by,
            }) if record == closing.current().at => {
                let finalized = self.recover_closure(closing.current(), consumed_by).await?;
                let (outcome, considered) = self.closure_pool(auction, closing.target()).await?;
                ClosedAuction::restore(finalized, outcome, considered)?
            }
            Err(err) => return Err(err),
        };

        tracing::info!(state = %closed.state(), tx = %closed.finalized.id(), "Auction closed");
        self.coordinator
            .notifier()
            .notify(&closed.finalized, &audience)
            .await;
        Ok(closed)
    }

    /// Run bid jobs for a closed auction. Every considered bid gets exactly
    /// one result, in repository order.
    pub async fn settle_bids(&self, closed: &ClosedAuction) -> Vec<BidResult> {
        let mut settled: HashMap<BidRef, BidResult> = if closed.outcome.success {
            self.coordinator
                .settle_all(closed)
                .await
                .into_iter()
                .map(|r| (r.bid, r))
                .collect()
        } else {
            HashMap::new()
        };
        closed
            .considered
            .iter()
            .map(|c| {
                settled.remove(&c.bid).unwrap_or_else(|| BidResult {
                    bid: c.bid,
                    bidder: c.bidder,
                    settlement: BidSettlement::NotAllotted,
                })
            })
            .collect()
    }

    /// Re-run the job for one bid of an auction that is already closed.
    ///
    /// The allocation is recomputed from the ledger and checked against the
    /// digest stored at closure before anything is proposed. A bid that is
    /// already ALLOTTED is reported as such without a new transition. An
    /// auction the local store still sees OPEN is looked up with the oracle,
    /// in case its closure was finalized but never recorded here.
    ///
    /// # Errors
    /// - `NotAuctionOwner`, `AuctionStateMismatch` (not closed yet)
    /// - `AllocationDiverged` if the bid set changed since closure
    /// - `BidNotFound`, `TransitionNotFound`
    pub async fn resume_bid(&self, auction: AuctionRef, bid: BidRef) -> Result<BidResult> {
        let current = self.ports.store.auction(auction).await?;
        let record = &current.record;
        if record.owner != self.key.id() {
            return Err(BookbuildError::NotAuctionOwner {
                auction,
                caller: self.key.id(),
            });
        }
        let not_closed = || BookbuildError::AuctionStateMismatch {
            auction,
            state: record.state.to_string(),
            expected: "closed",
        };
        let finalized = if record.is_open() {
            match self.ports.oracle.consumed_by(current.at).await? {
                Some(by) => self.recover_closure(&current, by).await?,
                None => return Err(not_closed()),
            }
        } else if record.state.is_terminal() {
            self.ports.store.transaction(current.at.tx).await?
        } else {
            return Err(not_closed());
        };
        let target = CapitalTarget::new(record.capital_target)?;
        let (outcome, considered) = self.closure_pool(auction, target).await?;
        let closed = ClosedAuction::restore(finalized, outcome, considered)?;

        let bidder = closed
            .considered
            .iter()
            .find(|c| c.bid == bid)
            .ok_or(BookbuildError::BidNotFound(bid))?
            .bidder;
        match closed.outcome.get(&bid) {
            Some(allotted) if closed.outcome.success => {
                Ok(self.coordinator.settle_bid_traced(&closed, allotted).await)
            }
            _ => Ok(BidResult {
                bid,
                bidder,
                settlement: BidSettlement::NotAllotted,
            }),
        }
    }

    /// The bids a closure allocated over, recomputed from the store.
    async fn closure_pool(
        &self,
        auction: AuctionRef,
        target: CapitalTarget,
    ) -> Result<(AllocationOutcome, Vec<ConsideredBid>)> {
        // Losers are never mutated, so OPEN plus ALLOTTED is the closure's bid set.
        let pool: Vec<_> = self
            .ports
            .store
            .bids(auction)
            .await?
            .into_iter()
            .filter(|s| matches!(s.record.status, BidStatus::Open | BidStatus::Allotted))
            .collect();
        let outcome = allocate(pool.iter().map(|s| &s.record), target);
        let considered = pool
            .iter()
            .map(|s| ConsideredBid {
                bid: s.record.id,
                bidder: s.record.bidder,
            })
            .collect();
        Ok((outcome, considered))
    }

    /// Fetch the closure that consumed `current` from the oracle and record it.
    async fn recover_closure(
        &self,
        current: &StateAndRef<AuctionRecord>,
        consumed_by: TransitionId,
    ) -> Result<FinalizedTransition> {
        let finalized = self.ports.oracle.transaction(consumed_by).await?;
        finalized.verify(self.ports.oracle.identity())?;
        let tx = finalized.transition();
        if tx.command != Command::CloseAuction || tx.inputs != [current.at] {
            return Err(BookbuildError::InputConsumed {
                record: current.at,
                consumed_by,
            });
        }
        tracing::warn!(auction = %current.record.id, tx = %consumed_by, "Recovering closure the store never recorded");
        self.persist(&finalized).await;
        Ok(finalized)
    }

    /// Record a finalized closure locally. It is final either way.
    async fn persist(&self, finalized: &FinalizedTransition) {
        if let Err(err) = self.ports.store.record(finalized).await {
            tracing::warn!(tx = %finalized.id(), error = %err, "Finalized closure not recorded locally");
        }
    }
}

fn report(closed: &ClosedAuction, bids: Vec<BidResult>) -> SettlementReport {
    SettlementReport {
        auction: closed.auction.record.id,
        state: closed.state(),
        closing: closed.finalized.id(),
        total_available: closed.outcome.total_available,
        total_raised: closed.outcome.total_raised,
        clearing_price: closed.outcome.clearing_price,
        bids,
    }
}
