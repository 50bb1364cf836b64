//! The external services one settling party talks to.

use std::sync::Arc;

use bookbuild_types::{Broadcaster, Network, PartyDirectory, RecordStore, SequencingOracle};

/// Handles to every collaborator, shared by the orchestrator and its jobs.
#[derive(Clone)]
pub struct Collaborators {
    /// This party's view of the ledger.
    pub store: Arc<dyn RecordStore>,
    pub oracle: Arc<dyn SequencingOracle>,
    pub network: Arc<dyn Network>,
    pub broadcaster: Arc<dyn Broadcaster>,
    /// Identities synced to counterparties before they are asked to sign.
    pub directory: Arc<PartyDirectory>,
}
