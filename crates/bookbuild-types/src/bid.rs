//! Bid record and its status transitions.
//!
//! A bid is created OPEN by the bidder and mutated exactly once by a
//! settlement job:
//! - `Open → Allotted` (the bid is part of the allocation; clearing price set)
//! - `Open → NotAllotted`

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionRef, BidRef, BookbuildError, PartyId, Result};

/// Lifecycle status of a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BidStatus {
    Open,
    Allotted,
    NotAllotted,
}

impl BidStatus {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Open, Self::Allotted | Self::NotAllotted))
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Allotted => write!(f, "ALLOTTED"),
            Self::NotAllotted => write!(f, "NOT_ALLOTTED"),
        }
    }
}

/// A sealed bid against one auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRecord {
    pub id: BidRef,
    pub auction: AuctionRef,
    pub bidder: PartyId,
    /// The auction owner, co-owner of the bid record.
    pub owner: PartyId,
    /// Unit price offered.
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: BidStatus,
    /// Set only when ALLOTTED.
    pub clearing_price: Option<Decimal>,
}

impl BidRecord {
    /// Price × quantity, saturating at `Decimal::MAX`.
    #[must_use]
    pub fn proceeds(&self) -> Decimal {
        self.price.checked_mul(self.quantity).unwrap_or(Decimal::MAX)
    }

    /// Positive price and quantity.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.price > Decimal::ZERO && self.quantity > Decimal::ZERO
    }

    /// Successor revision marking this bid ALLOTTED at `clearing_price`.
    ///
    /// # Errors
    /// Returns `IllegalStateChange` unless the bid is OPEN.
    pub fn allotted(&self, clearing_price: Decimal) -> Result<Self> {
        if !self.status.can_transition_to(BidStatus::Allotted) {
            return Err(BookbuildError::IllegalStateChange {
                machine: "bid",
                from: self.status.to_string(),
                to: BidStatus::Allotted.to_string(),
            });
        }
        Ok(Self {
            status: BidStatus::Allotted,
            clearing_price: Some(clearing_price),
            ..self.clone()
        })
    }

    /// Same offer: identity, parties, auction, price and quantity all equal.
    #[must_use]
    pub fn same_offer(&self, other: &Self) -> bool {
        self.id == other.id
            && self.auction == other.auction
            && self.bidder == other.bidder
            && self.owner == other.owner
            && self.price == other.price
            && self.quantity == other.quantity
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl BidRecord {
    pub fn dummy(
        auction: AuctionRef,
        bidder: PartyId,
        owner: PartyId,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: BidRef::new(),
            auction,
            bidder,
            owner,
            price,
            quantity,
            status: BidStatus::Open,
            clearing_price: None,
        }
    }
}
