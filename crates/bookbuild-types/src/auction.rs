//! Auction record and its lifecycle.
//!
//! ## State Machine
//!
//! ```text
//!   ┌──────┐  close   ┌─────────┐  finalized, target met   ┌─────────┐
//!   │ OPEN ├─────────▶│ CLOSING ├─────────────────────────▶│ SUCCESS │
//!   └──────┘          └────┬────┘                          └─────────┘
//!                          │ finalized, target missed
//!                          ▼
//!                      ┌──────┐
//!                      │ FAIL │
//!                      └──────┘
//! ```
//!
//! CLOSING only exists while the closing transition is under construction;
//! the persisted record carries [`AuctionState`], which has no CLOSING value.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionRef, BookbuildError, PartyId, Result};

/// Persisted lifecycle state of an auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionState {
    Open,
    Success,
    Fail,
}

impl AuctionState {
    /// Can the persisted state move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Open, Self::Success | Self::Fail))
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }
}

impl std::fmt::Display for AuctionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Phase of the settlement state machine driving one auction.
///
/// Transitions are **monotonic**:
/// - `Open → Closing`
/// - `Closing → Success | Fail`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementPhase {
    Open,
    Closing,
    Success,
    Fail,
}

impl SettlementPhase {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Closing) | (Self::Closing, Self::Success | Self::Fail)
        )
    }

    /// Terminal phase for an allocation outcome.
    #[must_use]
    pub fn terminal(success: bool) -> Self {
        if success { Self::Success } else { Self::Fail }
    }

    /// Persisted state corresponding to this phase. CLOSING persists as OPEN
    /// because the successor revision does not exist until finalization.
    #[must_use]
    pub fn persisted(&self) -> AuctionState {
        match self {
            Self::Open | Self::Closing => AuctionState::Open,
            Self::Success => AuctionState::Success,
            Self::Fail => AuctionState::Fail,
        }
    }

    /// Move to `target`, or fail with `IllegalStateChange`.
    pub fn advance(&mut self, target: Self) -> Result<()> {
        if !self.can_transition_to(target) {
            return Err(BookbuildError::IllegalStateChange {
                machine: "settlement",
                from: self.to_string(),
                to: target.to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

impl std::fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// The auction record. One current revision exists at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRecord {
    /// Stable reference, identical across revisions.
    pub id: AuctionRef,
    pub item_name: String,
    pub item_description: String,
    /// Capital the auction must raise. Positive.
    pub capital_target: Decimal,
    pub expiry: DateTime<Utc>,
    pub owner: PartyId,
    /// Observers informed of every outcome.
    pub participants: Vec<PartyId>,
    pub active: bool,
    pub state: AuctionState,
    /// Digest of the allocation decided at closure.
    pub allocation_root: Option<[u8; 32]>,
}

impl AuctionRecord {
    /// Open and accepting bids.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active && self.state == AuctionState::Open
    }

    #[must_use]
    pub fn has_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// The successor revision produced by the closing transition.
    ///
    /// # Errors
    /// Returns `IllegalStateChange` if this revision is already terminal or
    /// `state` is not terminal.
    pub fn closed(&self, state: AuctionState, allocation_root: [u8; 32]) -> Result<Self> {
        if !self.active || !self.state.can_transition_to(state) {
            return Err(BookbuildError::IllegalStateChange {
                machine: "auction",
                from: self.state.to_string(),
                to: state.to_string(),
            });
        }
        Ok(Self {
            active: false,
            state,
            allocation_root: Some(allocation_root),
            ..self.clone()
        })
    }

    /// Everyone who should observe outcomes: the owner first, then
    /// participants, without duplicates.
    #[must_use]
    pub fn audience(&self) -> Vec<PartyId> {
        let mut out = vec![self.owner];
        for p in &self.participants {
            if !out.contains(p) {
                out.push(*p);
            }
        }
        out
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl AuctionRecord {
    /// An open auction that expired one second ago.
    pub fn dummy(owner: PartyId, capital_target: Decimal, participants: Vec<PartyId>) -> Self {
        Self {
            id: AuctionRef::new(),
            item_name: "Series A".to_string(),
            item_description: "Test raise".to_string(),
            capital_target,
            expiry: Utc::now() - chrono::Duration::seconds(1),
            owner,
            participants,
            active: true,
            state: AuctionState::Open,
            allocation_root: None,
        }
    }
}
