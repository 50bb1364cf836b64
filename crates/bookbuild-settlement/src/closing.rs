//! Auction closing state machine.
//!
//! ```text
//!   begin()            propose()                     complete()
//!  OPEN ───────▶ CLOSING ───────▶ closing transition ───────────▶ SUCCESS | FAIL
//! ```
//!
//! [`AuctionClosing`] owns the phase; the only way out of CLOSING is
//! [`AuctionClosing::complete`] with the finalized closing transition, which
//! yields the [`ClosedAuction`] every bid job takes as its prerequisite.

use bookbuild_allocation::verify_allocation_root;
use bookbuild_types::{
    AllocationOutcome, AuctionRecord, AuctionState, BidRef, BookbuildError, CapitalTarget,
    Command, FinalizedTransition, LedgerRecord, PartyId, Result, SettlementPhase, StateAndRef,
    Transition,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// An auction whose closing transition is under construction.
#[derive(Debug)]
pub struct AuctionClosing {
    current: StateAndRef<AuctionRecord>,
    target: CapitalTarget,
    phase: SettlementPhase,
}

impl AuctionClosing {
    /// Check the preconditions and enter CLOSING.
    ///
    /// # Errors
    /// - `NotAuctionOwner` unless `caller` owns the auction
    /// - `AuctionStateMismatch` unless the auction is active and OPEN
    /// - `InvalidCapitalTarget` for a non-positive target
    pub fn begin(current: StateAndRef<AuctionRecord>, caller: PartyId) -> Result<Self> {
        let auction = &current.record;
        if auction.owner != caller {
            return Err(BookbuildError::NotAuctionOwner {
                auction: auction.id,
                caller,
            });
        }
        if !auction.is_open() {
            let state = if auction.active {
                auction.state.to_string()
            } else {
                format!("inactive {}", auction.state)
            };
            return Err(BookbuildError::AuctionStateMismatch {
                auction: auction.id,
                state,
                expected: "active OPEN",
            });
        }
        let target = CapitalTarget::new(auction.capital_target)?;

        let mut phase = SettlementPhase::Open;
        phase.advance(SettlementPhase::Closing)?;
        Ok(Self {
            current,
            target,
            phase,
        })
    }

    /// Fail with `AuctionNotExpired` if `now` is before the expiry instant.
    pub fn ensure_expired(&self, now: DateTime<Utc>) -> Result<()> {
        if self.current.record.has_expired_at(now) {
            Ok(())
        } else {
            Err(BookbuildError::AuctionNotExpired {
                auction: self.current.record.id,
                expiry: self.current.record.expiry,
            })
        }
    }

    #[must_use]
    pub fn target(&self) -> CapitalTarget {
        self.target
    }

    #[must_use]
    pub fn phase(&self) -> SettlementPhase {
        self.phase
    }

    #[must_use]
    pub fn current(&self) -> &StateAndRef<AuctionRecord> {
        &self.current
    }

    /// The closing transition for `outcome`: consumes the current revision
    /// and outputs its inactive, terminal successor. Owner-signed only.
    pub fn propose(&self, outcome: &AllocationOutcome, valid_until: DateTime<Utc>) -> Result<Transition> {
        let state = SettlementPhase::terminal(outcome.success).persisted();
        let closed = self.current.record.closed(state, outcome.allocation_root)?;
        Ok(Transition {
            command: Command::CloseAuction,
            inputs: vec![self.current.at],
            references: Vec::new(),
            outputs: vec![LedgerRecord::Auction(closed)],
            required_signers: vec![self.current.record.owner],
            valid_until,
        })
    }

    /// Leave CLOSING with the finalized closing transition.
    ///
    /// # Errors
    /// `InvalidTransition` if `finalized` is not a closure of this auction
    /// revision matching `outcome`.
    pub fn complete(
        mut self,
        finalized: FinalizedTransition,
        outcome: AllocationOutcome,
        considered: Vec<ConsideredBid>,
    ) -> Result<ClosedAuction> {
        let closed = finalized
            .auction_output()
            .filter(|c| c.record.id == self.current.record.id)
            .ok_or_else(|| BookbuildError::InvalidTransition {
                reason: format!("{} does not close {}", finalized.id(), self.current.record.id),
            })?;
        if finalized.transition().inputs != [self.current.at]
            || closed.record.allocation_root != Some(outcome.allocation_root)
        {
            return Err(BookbuildError::InvalidTransition {
                reason: format!("{} is not the closing transition proposed", finalized.id()),
            });
        }

        self.phase.advance(SettlementPhase::terminal(outcome.success))?;
        Ok(ClosedAuction {
            auction: closed,
            finalized,
            outcome,
            considered,
        })
    }
}

/// A bid that took part in the allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsideredBid {
    pub bid: BidRef,
    pub bidder: PartyId,
}

/// A finalized auction closure, the prerequisite of every bid job.
#[derive(Debug, Clone)]
pub struct ClosedAuction {
    /// The closed revision, referenced read-only by bid jobs.
    pub auction: StateAndRef<AuctionRecord>,
    /// The finalized closing transition, sent to bidders as a dependency.
    pub finalized: FinalizedTransition,
    pub outcome: AllocationOutcome,
    /// Every bid the allocation ran over, in repository order.
    pub considered: Vec<ConsideredBid>,
}

impl ClosedAuction {
    /// Rebuild from a closing transition finalized earlier, for a resumed
    /// job or a closure whose local record was lost.
    ///
    /// # Errors
    /// - `InvalidTransition` if `finalized` is not an auction closure
    /// - `AllocationDiverged` if `outcome` does not match the digest stored at closure
    pub fn restore(
        finalized: FinalizedTransition,
        outcome: AllocationOutcome,
        considered: Vec<ConsideredBid>,
    ) -> Result<Self> {
        let auction = finalized
            .auction_output()
            .filter(|c| {
                finalized.transition().command == Command::CloseAuction
                    && !c.record.active
                    && c.record.state.is_terminal()
            })
            .ok_or_else(|| BookbuildError::InvalidTransition {
                reason: format!("{} is not an auction closure", finalized.id()),
            })?;
        let expected_state = SettlementPhase::terminal(outcome.success).persisted();
        let digest_matches = auction.record.allocation_root.is_some_and(|root| {
            verify_allocation_root(&outcome.allocation, outcome.clearing_price, &root)
        });
        if !digest_matches || auction.record.state != expected_state {
            return Err(BookbuildError::AllocationDiverged(auction.record.id));
        }
        Ok(Self {
            auction,
            finalized,
            outcome,
            considered,
        })
    }

    #[must_use]
    pub fn state(&self) -> AuctionState {
        self.auction.record.state
    }

    #[must_use]
    pub fn owner(&self) -> PartyId {
        self.auction.record.owner
    }

    #[must_use]
    pub fn clearing_price(&self) -> Option<Decimal> {
        self.outcome.clearing_price
    }
}
