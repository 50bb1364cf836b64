//! # bookbuild-types
//!
//! Shared types, ports and errors for **bookbuild**, the settlement plane of a
//! sealed-bid capital-raising auction.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`AuctionRef`], [`BidRef`], [`PartyId`], [`TransitionId`], [`RecordRef`]
//! - **Parties**: [`PartyKey`], [`PartySignature`], [`PartyIdentity`], [`PartyDirectory`]
//! - **Records**: [`AuctionRecord`], [`BidRecord`], [`LedgerRecord`], [`StateAndRef`]
//! - **Lifecycles**: [`AuctionState`], [`SettlementPhase`], [`BidStatus`]
//! - **Transitions**: [`Transition`], [`SignedTransition`], [`FinalizedTransition`], [`Command`]
//! - **Allocation model**: [`CapitalTarget`], [`AllottedBid`], [`AllocationOutcome`]
//! - **Outcomes**: [`SettlementReport`], [`BidResult`], [`BidSettlement`], [`SettlementStep`]
//! - **Ports**: [`RecordStore`], [`SequencingOracle`], [`Network`], [`Session`], [`Responder`], [`Broadcaster`]
//! - **Configuration**: [`SettlementConfig`]
//! - **Errors**: [`BookbuildError`] with `BB_ERR_` prefix codes
//! - **Constants**: system-wide defaults and domain separators

pub mod allocation;
pub mod auction;
pub mod bid;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod outcome;
pub mod party;
pub mod ports;
pub mod record;
pub mod transition;

// Re-export all primary types at crate root for ergonomic imports:
//   use bookbuild_types::{AuctionRecord, BidRecord, Transition, ...};

pub use allocation::*;
pub use auction::*;
pub use bid::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use outcome::*;
pub use party::*;
pub use ports::*;
pub use record::*;
pub use transition::*;

// Constants are accessed via `bookbuild_types::constants::FOO`
// (not re-exported to avoid name collisions).
