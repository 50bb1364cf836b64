//! Allocation digest for cross-run consistency.
//!
//! The orchestrator stores the digest on the closed auction record. A later
//! resume recomputes the allocation and compares digests instead of whole
//! payloads.

use bookbuild_types::{AllottedBid, constants};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Digest over the ordered allocation and its clearing price.
///
/// Decimals are hashed in normalized form so `11` and `11.0` agree.
#[must_use]
pub fn compute_allocation_root(allocation: &[AllottedBid], clearing_price: Option<Decimal>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(constants::ALLOCATION_DOMAIN);
    hasher.update((allocation.len() as u64).to_le_bytes());

    for a in allocation {
        hasher.update(a.bid.0.as_bytes());
        hasher.update(a.bidder.as_bytes());
        put_decimal(&mut hasher, a.price);
        put_decimal(&mut hasher, a.quantity);
    }

    match clearing_price {
        Some(cp) => {
            hasher.update([1u8]);
            put_decimal(&mut hasher, cp);
        }
        None => hasher.update([0u8]),
    }

    let mut root = [0u8; 32];
    root.copy_from_slice(&hasher.finalize());
    root
}

/// Recompute and compare.
#[must_use]
pub fn verify_allocation_root(
    allocation: &[AllottedBid],
    clearing_price: Option<Decimal>,
    expected_root: &[u8; 32],
) -> bool {
    compute_allocation_root(allocation, clearing_price) == *expected_root
}

fn put_decimal(hasher: &mut Sha256, d: Decimal) {
    let text = d.normalize().to_string();
    hasher.update((text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}
