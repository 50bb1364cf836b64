//! Allocation model: the input target and the engine's output.
//!
//! The engine itself lives in `bookbuild-allocation`; these are the shapes it
//! shares with the settlement plane.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BidRef, BookbuildError, PartyId, Result};

/// A strictly positive capital target.
///
/// The allocation engine only accepts this type, so a zero or negative
/// target is rejected before the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct CapitalTarget(Decimal);

impl CapitalTarget {
    /// # Errors
    /// Returns [`BookbuildError::InvalidCapitalTarget`] unless `amount > 0`.
    pub fn new(amount: Decimal) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(BookbuildError::InvalidCapitalTarget(amount));
        }
        Ok(Self(amount))
    }

    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for CapitalTarget {
    type Error = BookbuildError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CapitalTarget> for Decimal {
    fn from(value: CapitalTarget) -> Self {
        value.0
    }
}

impl fmt::Display for CapitalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One bid selected into the allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllottedBid {
    pub bid: BidRef,
    pub bidder: PartyId,
    pub price: Decimal,
    pub quantity: Decimal,
}

impl AllottedBid {
    #[must_use]
    pub fn proceeds(&self) -> Decimal {
        self.price.checked_mul(self.quantity).unwrap_or(Decimal::MAX)
    }
}

/// Deterministic output of the allocation engine.
///
/// Given the same bids in the same order and the same target, every run
/// produces the exact same outcome, including `allocation_root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    /// Bids selected, in ascending price order.
    pub allocation: Vec<AllottedBid>,
    /// Σ price × quantity over all well-formed open bids.
    pub total_available: Decimal,
    /// Σ price × quantity over the allocation.
    pub total_raised: Decimal,
    /// Quantity-weighted average price of the allocation. `None` when empty.
    pub clearing_price: Option<Decimal>,
    pub success: bool,
    /// SHA-256 digest over the allocation and clearing price.
    pub allocation_root: [u8; 32],
}

impl AllocationOutcome {
    #[must_use]
    pub fn contains(&self, bid: &BidRef) -> bool {
        self.allocation.iter().any(|a| a.bid == *bid)
    }

    #[must_use]
    pub fn get(&self, bid: &BidRef) -> Option<&AllottedBid> {
        self.allocation.iter().find(|a| a.bid == *bid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_target_rejected() {
        let err = CapitalTarget::new(Decimal::ZERO).unwrap_err();
        assert!(matches!(err, BookbuildError::InvalidCapitalTarget(d) if d.is_zero()));
        assert!(CapitalTarget::new(Decimal::new(-5, 0)).is_err());
        assert_eq!(CapitalTarget::new(Decimal::ONE).unwrap().amount(), Decimal::ONE);
    }

    #[test]
    fn serde_rejects_non_positive_target() {
        let ok: CapitalTarget = serde_json::from_str("\"80\"").unwrap();
        assert_eq!(ok.amount(), Decimal::new(80, 0));
        assert!(serde_json::from_str::<CapitalTarget>("\"0\"").is_err());
    }
}
