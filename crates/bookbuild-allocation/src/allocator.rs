//! Pure deterministic allocation.
//!
//! ```text
//! allocate(open bids, CapitalTarget) -> AllocationOutcome
//! ```
//!
//! No I/O and no clock. The same bids in the same order with the same target
//! always produce the same outcome, digest included.

use bookbuild_types::{AllocationOutcome, AllottedBid, BidRecord, CapitalTarget};
use rust_decimal::Decimal;

use crate::{clearing::compute_clearing_price, determinism::compute_allocation_root};

/// Select the bids that fill `target`.
///
/// ## Algorithm
///
/// 1. Skip bids with non-positive price or quantity
/// 2. `total_available` = Σ price × quantity over the remaining bids
/// 3. If `total_available < target` the auction fails with an empty allocation
/// 4. Otherwise sort ascending by unit price (stable, ties keep input order)
///    and take the minimal prefix whose proceeds reach the target, including
///    the bid that crosses it
/// 5. Clearing price is the quantity-weighted average over that prefix
///
/// Status is not inspected: the caller decides which bids are candidates.
#[must_use]
pub fn allocate<'a>(
    bids: impl IntoIterator<Item = &'a BidRecord>,
    target: CapitalTarget,
) -> AllocationOutcome {
    let mut candidates: Vec<&BidRecord> = Vec::new();
    for bid in bids {
        if bid.is_well_formed() {
            candidates.push(bid);
        } else {
            tracing::warn!(
                bid = %bid.id,
                price = %bid.price,
                quantity = %bid.quantity,
                "Skipping malformed bid"
            );
        }
    }

    let total_available = candidates
        .iter()
        .fold(Decimal::ZERO, |acc, b| saturating_add(acc, b.proceeds()));

    if total_available < target.amount() {
        tracing::debug!(
            %total_available,
            %target,
            bids = candidates.len(),
            "Open bids cannot meet the capital target"
        );
        return failed(total_available);
    }

    // `sort_by` is stable: equal prices keep repository order.
    candidates.sort_by(|a, b| a.price.cmp(&b.price));

    let mut allocation = Vec::new();
    let mut total_raised = Decimal::ZERO;
    for bid in candidates {
        if total_raised >= target.amount() {
            break;
        }
        total_raised = saturating_add(total_raised, bid.proceeds());
        allocation.push(AllottedBid {
            bid: bid.id,
            bidder: bid.bidder,
            price: bid.price,
            quantity: bid.quantity,
        });
    }

    let clearing_price = compute_clearing_price(&allocation);
    let allocation_root = compute_allocation_root(&allocation, clearing_price);

    tracing::debug!(
        allotted = allocation.len(),
        %total_raised,
        clearing_price = ?clearing_price,
        root = %hex::encode(&allocation_root[..8]),
        "Allocation computed"
    );

    AllocationOutcome {
        allocation,
        total_available,
        total_raised,
        clearing_price,
        success: true,
        allocation_root,
    }
}

fn failed(total_available: Decimal) -> AllocationOutcome {
    AllocationOutcome {
        allocation: Vec::new(),
        total_available,
        total_raised: Decimal::ZERO,
        clearing_price: None,
        success: false,
        allocation_root: compute_allocation_root(&[], None),
    }
}

fn saturating_add(a: Decimal, b: Decimal) -> Decimal {
    a.checked_add(b).unwrap_or(Decimal::MAX)
}
