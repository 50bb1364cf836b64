//! # bookbuild-allocation
//!
//! **Pure deterministic allocation engine for bookbuild.**
//!
//! Given the open bids of one auction and its capital target, selects the
//! minimal price-ascending prefix of bids that raises the target and prices
//! it at the quantity-weighted average. It has:
//!
//! - **Zero side effects**: no ledger access, no clock, no signing
//! - **Deterministic output**: same bids and target -> same outcome and digest
//! - **Typed input**: only a positive [`CapitalTarget`](bookbuild_types::CapitalTarget) is accepted

pub mod allocator;
pub mod clearing;
pub mod determinism;

pub use allocator::allocate;
pub use clearing::compute_clearing_price;
pub use determinism::{compute_allocation_root, verify_allocation_root};
