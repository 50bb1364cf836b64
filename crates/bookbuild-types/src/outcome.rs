//! What a settlement invocation reports back to its caller.

use rust_decimal::Decimal;

use crate::{AuctionRef, AuctionState, BidRef, BookbuildError, PartyId, TransitionId};

/// Protocol step a bid-settlement job had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettlementStep {
    /// Re-reading the bid and building the proposed transition.
    Generating,
    /// Checking the proposal against the contract rules.
    Verifying,
    /// Owner signature.
    Signing,
    /// Session handshake and counterparty signature.
    GatheringSignatures,
    /// Oracle finalization.
    Finalising,
    /// Notifying observers and releasing the bidder session.
    Broadcasting,
}

impl std::fmt::Display for SettlementStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generating => write!(f, "GENERATING"),
            Self::Verifying => write!(f, "VERIFYING"),
            Self::Signing => write!(f, "SIGNING"),
            Self::GatheringSignatures => write!(f, "GATHERING_SIGS"),
            Self::Finalising => write!(f, "FINALISING"),
            Self::Broadcasting => write!(f, "BROADCASTING"),
        }
    }
}

/// Per-bid outcome.
#[derive(Debug, Clone)]
pub enum BidSettlement {
    /// The bid is ALLOTTED on the ledger by `transition`.
    Allotted {
        clearing_price: Decimal,
        transition: TransitionId,
    },
    /// The bid is not part of the allocation (or the auction failed).
    NotAllotted,
    /// The job failed; the bid is still OPEN and may be resumed.
    Failed {
        step: SettlementStep,
        error: BookbuildError,
    },
}

impl BidSettlement {
    #[must_use]
    pub fn is_allotted(&self) -> bool {
        matches!(self, Self::Allotted { .. })
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// A failed job the caller may resume later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.error().is_some_and(BookbuildError::is_retryable)
    }

    /// The failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&BookbuildError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Allotted { .. } | Self::NotAllotted => None,
        }
    }
}

impl std::fmt::Display for BidSettlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allotted { clearing_price, .. } => write!(f, "ALLOTTED @ {clearing_price}"),
            Self::NotAllotted => write!(f, "NOT_ALLOTTED"),
            Self::Failed { step, error } => write!(f, "FAILED at {step}: {error}"),
        }
    }
}

/// Outcome for one bid.
#[derive(Debug, Clone)]
pub struct BidResult {
    pub bid: BidRef,
    pub bidder: PartyId,
    pub settlement: BidSettlement,
}

/// What the caller of a settlement receives: the finalized auction outcome
/// plus one result per bid.
#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub auction: AuctionRef,
    pub state: AuctionState,
    /// The finalized closing transition.
    pub closing: TransitionId,
    pub total_available: Decimal,
    pub total_raised: Decimal,
    pub clearing_price: Option<Decimal>,
    pub bids: Vec<BidResult>,
}

impl SettlementReport {
    #[must_use]
    pub fn allotted(&self) -> usize {
        self.bids.iter().filter(|b| b.settlement.is_allotted()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.bids.iter().filter(|b| b.settlement.is_failed()).count()
    }

    #[must_use]
    pub fn result_for(&self, bid: &BidRef) -> Option<&BidResult> {
        self.bids.iter().find(|b| b.bid == *bid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_order_follows_protocol() {
        assert!(SettlementStep::Generating < SettlementStep::GatheringSignatures);
        assert!(SettlementStep::Finalising < SettlementStep::Broadcasting);
    }

    #[test]
    fn failed_display_names_step() {
        let s = BidSettlement::Failed {
            step: SettlementStep::GatheringSignatures,
            error: BookbuildError::SignatureDeclined {
                party: PartyId([0; 32]),
                reason: "price changed".into(),
            },
        };
        let text = s.to_string();
        assert!(text.contains("GATHERING_SIGS"));
        assert!(text.contains("price changed"));
        assert!(s.is_failed());
        assert!(s.error().is_some());
    }

    #[test]
    fn report_counts() {
        let report = SettlementReport {
            auction: AuctionRef::new(),
            state: AuctionState::Success,
            closing: TransitionId([0; 32]),
            total_available: Decimal::new(100, 0),
            total_raised: Decimal::new(100, 0),
            clearing_price: Some(Decimal::new(11, 0)),
            bids: vec![
                BidResult {
                    bid: BidRef::new(),
                    bidder: PartyId([1; 32]),
                    settlement: BidSettlement::Allotted {
                        clearing_price: Decimal::new(11, 0),
                        transition: TransitionId([2; 32]),
                    },
                },
                BidResult {
                    bid: BidRef::new(),
                    bidder: PartyId([2; 32]),
                    settlement: BidSettlement::NotAllotted,
                },
            ],
        };
        assert_eq!(report.allotted(), 1);
        assert_eq!(report.failed(), 0);
        let first = report.bids[0].bid;
        assert!(report.result_for(&first).is_some());
    }
}
