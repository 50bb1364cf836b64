//! Clearing price: the quantity-weighted average price of an allocation.

use bookbuild_types::AllottedBid;
use rust_decimal::Decimal;

/// `Σ(price × quantity) / Σ(quantity)` over the allocation.
///
/// Returns `None` for an empty allocation (there is no price to report) and
/// on arithmetic overflow.
#[must_use]
pub fn compute_clearing_price(allocation: &[AllottedBid]) -> Option<Decimal> {
    if allocation.is_empty() {
        return None;
    }
    let mut notional = Decimal::ZERO;
    let mut quantity = Decimal::ZERO;
    for a in allocation {
        notional = notional.checked_add(a.price.checked_mul(a.quantity)?)?;
        quantity = quantity.checked_add(a.quantity)?;
    }
    notional.checked_div(quantity)
}

#[cfg(test)]
mod tests {
    use bookbuild_types::{BidRef, PartyId};

    use super::*;

    fn allotted(price: Decimal, qty: Decimal) -> AllottedBid {
        AllottedBid {
            bid: BidRef::new(),
            bidder: PartyId([1; 32]),
            price,
            quantity: qty,
        }
    }

    #[test]
    fn empty_has_no_price() {
        assert!(compute_clearing_price(&[]).is_none());
    }

    #[test]
    fn equal_quantities_average_prices() {
        let cp = compute_clearing_price(&[
            allotted(Decimal::new(10, 0), Decimal::new(5, 0)),
            allotted(Decimal::new(12, 0), Decimal::new(5, 0)),
        ]);
        assert_eq!(cp, Some(Decimal::new(11, 0)));
    }

    #[test]
    fn weighted_by_quantity() {
        // (10*1 + 20*3) / 4 = 17.5
        let cp = compute_clearing_price(&[
            allotted(Decimal::new(10, 0), Decimal::ONE),
            allotted(Decimal::new(20, 0), Decimal::new(3, 0)),
        ]);
        assert_eq!(cp, Some(Decimal::new(175, 1)));
    }

    #[test]
    fn single_bid_clears_at_its_price() {
        let cp = compute_clearing_price(&[allotted(Decimal::new(725, 2), Decimal::new(3, 0))]);
        assert_eq!(cp, Some(Decimal::new(725, 2)));
    }
}
