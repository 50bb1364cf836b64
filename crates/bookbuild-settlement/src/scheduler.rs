//! Expiry-driven settlement.

use std::sync::Arc;

use bookbuild_types::{AuctionRecord, AuctionRef, BookbuildError, Result, SettlementReport};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::SettlementOrchestrator;

/// Spawns one settlement task per auction, fired at its expiry.
#[derive(Clone)]
pub struct ExpiryScheduler {
    orchestrator: Arc<SettlementOrchestrator>,
}

impl ExpiryScheduler {
    #[must_use]
    pub fn new(orchestrator: Arc<SettlementOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Settle `auction` once its expiry has passed. Must be called within a
    /// tokio runtime.
    #[must_use]
    pub fn schedule(&self, auction: &AuctionRecord) -> ScheduledSettlement {
        let orchestrator = Arc::clone(&self.orchestrator);
        let id = auction.id;
        let expiry = auction.expiry;
        let span = tracing::info_span!("scheduled_settlement", auction = %id, %expiry);

        let handle = tokio::spawn(
            async move {
                // The wall clock can lag the timer; re-check before settling.
                while let Ok(wait) = (expiry - Utc::now()).to_std() {
                    if wait.is_zero() {
                        break;
                    }
                    tokio::time::sleep(wait).await;
                }
                tracing::info!("Expiry reached");
                orchestrator.settle(id).await
            }
            .instrument(span),
        );
        tracing::debug!(auction = %id, %expiry, "Settlement scheduled");
        ScheduledSettlement {
            auction: id,
            handle,
        }
    }
}

/// A pending settlement task.
pub struct ScheduledSettlement {
    auction: AuctionRef,
    handle: JoinHandle<Result<SettlementReport>>,
}

impl ScheduledSettlement {
    #[must_use]
    pub fn auction(&self) -> AuctionRef {
        self.auction
    }

    /// Abort the task at its next suspension point.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait for the settlement report.
    ///
    /// # Errors
    /// The settlement error, or `Internal` if the task was cancelled or panicked.
    pub async fn join(self) -> Result<SettlementReport> {
        let auction = self.auction;
        self.handle.await.map_err(|e| {
            BookbuildError::Internal(format!("scheduled settlement of {auction}: {e}"))
        })?
    }
}
