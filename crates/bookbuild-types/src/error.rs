//! Error types for bookbuild settlement.
//!
//! All errors use the `BB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors
//! - 2xx: Concurrency conflicts (consumed or stale inputs)
//! - 3xx: Signature errors
//! - 4xx: Network errors
//! - 5xx: Reference errors
//! - 9xx: General / internal errors
//!
//! Every variant maps onto one [`ErrorKind`], which is what callers branch
//! on when deciding whether a failed job may be retried.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AuctionRef, BidRef, BidStatus, PartyId, RecordRef, TransitionId};

/// Coarse classification of a [`BookbuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed transition contents or illegal request. Fatal to the job.
    Validation,
    /// Input already consumed or no longer current. Fatal, never retried automatically.
    ConcurrencyConflict,
    /// Counterparty policy rejection.
    SignatureDeclined,
    /// Session or oracle unreachable. Retryable by the caller.
    NetworkTimeout,
    /// Unknown auction, bid or record revision.
    ReferenceNotFound,
    /// Unrecoverable internal error.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::ConcurrencyConflict => write!(f, "CONCURRENCY_CONFLICT"),
            Self::SignatureDeclined => write!(f, "SIGNATURE_DECLINED"),
            Self::NetworkTimeout => write!(f, "NETWORK_TIMEOUT"),
            Self::ReferenceNotFound => write!(f, "REFERENCE_NOT_FOUND"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Central error enum for all bookbuild operations.
#[derive(Debug, Clone, Error)]
pub enum BookbuildError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The transition failed contract verification.
    #[error("BB_ERR_100: Invalid transition: {reason}")]
    InvalidTransition { reason: String },

    /// Capital targets must be strictly positive.
    #[error("BB_ERR_101: Invalid capital target: {0}")]
    InvalidCapitalTarget(Decimal),

    /// A lifecycle state machine was asked to move along an edge it does not have.
    #[error("BB_ERR_102: Illegal {machine} transition: {from} -> {to}")]
    IllegalStateChange {
        machine: &'static str,
        from: String,
        to: String,
    },

    /// Only the auction owner may close an auction and allot its bids.
    #[error("BB_ERR_103: {caller} is not the owner of {auction}")]
    NotAuctionOwner { auction: AuctionRef, caller: PartyId },

    /// Scheduled settlement was triggered before the expiry instant.
    #[error("BB_ERR_104: {auction} has not expired yet (expiry {expiry})")]
    AuctionNotExpired {
        auction: AuctionRef,
        expiry: DateTime<Utc>,
    },

    /// The auction is not in the state the operation needs.
    #[error("BB_ERR_105: {auction} is {state}, expected {expected}")]
    AuctionStateMismatch {
        auction: AuctionRef,
        state: String,
        expected: &'static str,
    },

    /// A recomputed allocation does not match the digest stored at closure.
    #[error("BB_ERR_106: Allocation for {0} diverged since closure")]
    AllocationDiverged(AuctionRef),

    // =================================================================
    // Concurrency Conflicts (2xx)
    // =================================================================
    /// The input revision was already consumed by another transition.
    #[error("BB_ERR_200: Input {record} already consumed by {consumed_by}")]
    InputConsumed {
        record: RecordRef,
        consumed_by: TransitionId,
    },

    /// A reference input is no longer the current revision.
    #[error("BB_ERR_201: Reference {record} is stale")]
    ReferenceStale { record: RecordRef },

    /// The transition was presented after its validity window.
    #[error("BB_ERR_202: Transition expired at {valid_until}")]
    TransitionExpired { valid_until: DateTime<Utc> },

    /// The bid's current revision is not OPEN any more.
    #[error("BB_ERR_203: {bid} is {status}, expected OPEN")]
    BidNotOpen { bid: BidRef, status: BidStatus },

    // =================================================================
    // Signature Errors (3xx)
    // =================================================================
    /// The counterparty refused to co-sign.
    #[error("BB_ERR_300: Signature declined by {party}: {reason}")]
    SignatureDeclined { party: PartyId, reason: String },

    /// A signature did not verify against the transition id.
    #[error("BB_ERR_301: Invalid signature from {party}")]
    SignatureInvalid { party: PartyId },

    /// A required signer has not signed.
    #[error("BB_ERR_302: Missing signature from {party}")]
    SignatureMissing { party: PartyId },

    // =================================================================
    // Network Errors (4xx)
    // =================================================================
    /// A suspension point did not resume in time.
    #[error("BB_ERR_400: Timed out during {operation} after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// The peer closed the session.
    #[error("BB_ERR_401: Session with {party} closed")]
    SessionClosed { party: PartyId },

    /// No route to the party.
    #[error("BB_ERR_402: Party unreachable: {0}")]
    PartyUnreachable(PartyId),

    // =================================================================
    // Reference Errors (5xx)
    // =================================================================
    #[error("BB_ERR_500: Auction not found: {0}")]
    AuctionNotFound(AuctionRef),

    #[error("BB_ERR_501: Bid not found: {0}")]
    BidNotFound(BidRef),

    /// The revision is unknown to the oracle (never produced, or not yet finalized).
    #[error("BB_ERR_502: Record revision not found: {0}")]
    RecordNotFound(RecordRef),

    #[error("BB_ERR_503: Transition not found: {0}")]
    TransitionNotFound(TransitionId),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("BB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid config file, zero limits, etc.).
    #[error("BB_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("BB_ERR_903: I/O error: {0}")]
    Io(String),

    /// The peer sent a message out of protocol order.
    #[error("BB_ERR_904: Protocol violation: expected {expected}, got {got}")]
    ProtocolViolation { expected: &'static str, got: String },
}

impl BookbuildError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTransition { .. }
            | Self::InvalidCapitalTarget(_)
            | Self::IllegalStateChange { .. }
            | Self::NotAuctionOwner { .. }
            | Self::AuctionNotExpired { .. }
            | Self::AuctionStateMismatch { .. }
            | Self::AllocationDiverged(_)
            | Self::SignatureInvalid { .. }
            | Self::SignatureMissing { .. }
            | Self::Configuration(_) => ErrorKind::Validation,
            Self::InputConsumed { .. }
            | Self::ReferenceStale { .. }
            | Self::TransitionExpired { .. }
            | Self::BidNotOpen { .. } => ErrorKind::ConcurrencyConflict,
            Self::SignatureDeclined { .. } => ErrorKind::SignatureDeclined,
            Self::Timeout { .. } | Self::SessionClosed { .. } | Self::PartyUnreachable(_) => {
                ErrorKind::NetworkTimeout
            }
            Self::AuctionNotFound(_)
            | Self::BidNotFound(_)
            | Self::RecordNotFound(_)
            | Self::TransitionNotFound(_) => ErrorKind::ReferenceNotFound,
            Self::Internal(_)
            | Self::Io(_)
            | Self::ProtocolViolation { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the failed operation later.
    ///
    /// Nothing is retried automatically; this only informs the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::NetworkTimeout
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, BookbuildError>;

impl From<std::io::Error> for BookbuildError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
