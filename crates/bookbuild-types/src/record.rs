//! Ledger records and revision handles.

use serde::{Deserialize, Serialize};

use crate::{AuctionRecord, BidRecord, PartyId, RecordRef};

/// Any record the ledger sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRecord {
    Auction(AuctionRecord),
    Bid(BidRecord),
}

impl LedgerRecord {
    #[must_use]
    pub fn as_auction(&self) -> Option<&AuctionRecord> {
        match self {
            Self::Auction(a) => Some(a),
            Self::Bid(_) => None,
        }
    }

    #[must_use]
    pub fn as_bid(&self) -> Option<&BidRecord> {
        match self {
            Self::Bid(b) => Some(b),
            Self::Auction(_) => None,
        }
    }

    /// Parties that hold this record in their vaults.
    #[must_use]
    pub fn participants(&self) -> Vec<PartyId> {
        match self {
            Self::Auction(a) => a.audience(),
            Self::Bid(b) => vec![b.owner, b.bidder],
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auction(_) => "auction",
            Self::Bid(_) => "bid",
        }
    }
}

/// A record together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef<T> {
    pub record: T,
    pub at: RecordRef,
}

impl<T> StateAndRef<T> {
    #[must_use]
    pub fn new(record: T, at: RecordRef) -> Self {
        Self { record, at }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::{AuctionRef, BidRef, BidStatus};

    #[test]
    fn accessors_match_variant() {
        let bid = BidRecord {
            id: BidRef::new(),
            auction: AuctionRef::new(),
            bidder: PartyId([2; 32]),
            owner: PartyId([1; 32]),
            price: Decimal::ONE,
            quantity: Decimal::ONE,
            status: BidStatus::Open,
            clearing_price: None,
        };
        let record = LedgerRecord::Bid(bid.clone());
        assert_eq!(record.as_bid(), Some(&bid));
        assert!(record.as_auction().is_none());
        assert_eq!(record.kind(), "bid");
        assert_eq!(record.participants(), vec![PartyId([1; 32]), PartyId([2; 32])]);
    }
}
