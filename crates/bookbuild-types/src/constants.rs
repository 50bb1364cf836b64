//! System-wide constants for bookbuild settlement.

/// Default number of bid-settlement jobs allowed in flight at once.
pub const DEFAULT_WORKER_LIMIT: usize = 8;

/// Default validity window for a proposed transition in milliseconds.
///
/// A transition presented to the sequencing oracle after this window is
/// rejected as stale.
pub const DEFAULT_VALIDITY_WINDOW_MS: u64 = 30_000;

/// Default timeout for opening a session and syncing identities (milliseconds).
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 5_000;

/// Default timeout waiting for a counterparty signature (milliseconds).
pub const DEFAULT_SIGNATURE_TIMEOUT_MS: u64 = 10_000;

/// Default timeout for oracle finalization (milliseconds).
pub const DEFAULT_FINALIZE_TIMEOUT_MS: u64 = 10_000;

/// Default timeout waiting for the bidder to acknowledge a finalized
/// transition before the session is released (milliseconds).
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;

/// Domain separator for transition ids.
pub const TRANSITION_DOMAIN: &[u8] = b"bookbuild:tx:v1:";

/// Domain separator for allocation digests.
pub const ALLOCATION_DOMAIN: &[u8] = b"bookbuild:allocation:v1:";

/// Domain separator for oracle finality signatures.
pub const FINALITY_DOMAIN: &[u8] = b"bookbuild:finality:v1:";
