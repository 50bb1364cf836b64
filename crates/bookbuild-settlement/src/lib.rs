//! # bookbuild-settlement
//!
//! Settlement plane of a sealed-bid auction. Settling one auction is two
//! phases, strictly ordered:
//!
//! 1. **Closure**: the owner allocates over the OPEN bids and finalizes a
//!    single `CLOSE_AUCTION` transition that records SUCCESS or FAIL and the
//!    allocation digest ([`SettlementOrchestrator::close`]).
//! 2. **Bid jobs**: for each allotted bid, an independent two-party
//!    `ALLOT_BID` transition that references the closed auction read-only and
//!    needs the bidder's counter-signature ([`CommitCoordinator`]).
//!
//! The bidder side of phase 2 is [`BidderResponder`]. Observers learn the
//! results through the [`BroadcastNotifier`].

pub mod closing;
pub mod collaborators;
pub mod contract;
pub mod coordinator;
pub mod notifier;
pub mod orchestrator;
pub mod responder;
pub mod scheduler;

pub use closing::{AuctionClosing, ClosedAuction, ConsideredBid};
pub use collaborators::Collaborators;
pub use coordinator::CommitCoordinator;
pub use notifier::BroadcastNotifier;
pub use orchestrator::SettlementOrchestrator;
pub use responder::BidderResponder;
pub use scheduler::{ExpiryScheduler, ScheduledSettlement};
