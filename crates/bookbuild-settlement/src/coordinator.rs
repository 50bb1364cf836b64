//! Commit coordinator: one two-party settlement job per allotted bid.
//!
//! ```text
//! owner                                    bidder
//!   │ re-read bid, build ALLOT_BID, verify, sign
//!   │──── Sync{identities, closing tx} ──────▶│ verify + record dependency
//!   │──── Propose(owner-signed) ─────────────▶│ policy check
//!   │◀─── CounterSigned | Declined ───────────│
//!   │ finalize with the oracle, record, broadcast
//!   │──── Finalized ─────────────────────────▶│ verify + record
//!   │◀─── Ack ────────────────────────────────│
//! ```
//!
//! Jobs run concurrently, bounded by `worker_limit`. They share nothing but
//! the read-only [`ClosedAuction`]; the oracle arbitrates any conflict, and a
//! failed job never affects its siblings or the closure.

use std::{future::Future, time::Duration};

use bookbuild_types::{
    AllottedBid, BidResult, BidSettlement, BidStatus, BookbuildError, Command, FinalizedTransition,
    LedgerRecord, PartyKey, Result, Session, SessionMessage, SettlementConfig, SettlementStep,
    Transition, TransitionId,
};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use rust_decimal::Decimal;
use tracing::Instrument;

use crate::{ClosedAuction, Collaborators, contract, notifier::BroadcastNotifier};

/// Runs bid-settlement jobs on behalf of the auction owner.
pub struct CommitCoordinator {
    key: PartyKey,
    ports: Collaborators,
    notifier: BroadcastNotifier,
    config: SettlementConfig,
}

impl CommitCoordinator {
    #[must_use]
    pub fn new(key: PartyKey, ports: Collaborators, config: SettlementConfig) -> Self {
        Self {
            notifier: BroadcastNotifier::new(ports.broadcaster.clone()),
            key,
            ports,
            config,
        }
    }

    pub(crate) fn notifier(&self) -> &BroadcastNotifier {
        &self.notifier
    }

    /// Settle every bid in the allocation, at most `worker_limit` at a time.
    ///
    /// Results arrive in completion order.
    pub async fn settle_all(&self, closed: &ClosedAuction) -> Vec<BidResult> {
        let jobs: Vec<_> = closed
            .outcome
            .allocation
            .iter()
            .map(|allotted| self.settle_bid_traced(closed, allotted))
            .collect();
        stream::iter(jobs)
            .buffer_unordered(self.config.worker_limit)
            .collect()
            .await
    }

    pub(crate) fn settle_bid_traced<'a>(
        &'a self,
        closed: &'a ClosedAuction,
        allotted: &'a AllottedBid,
    ) -> impl Future<Output = BidResult> + Send + 'a {
        let span = tracing::info_span!(
            "settle_bid",
            bid = %allotted.bid,
            bidder = %allotted.bidder
        );
        self.settle_bid(closed, allotted).instrument(span)
    }

    /// Run one job to completion. Failures are reported, never propagated.
    pub async fn settle_bid(&self, closed: &ClosedAuction, allotted: &AllottedBid) -> BidResult {
        let mut step = SettlementStep::Generating;
        let settlement = match self.run(closed, allotted, &mut step).await {
            Ok((clearing_price, transition)) => {
                tracing::info!(tx = %transition, %clearing_price, "Bid allotted");
                BidSettlement::Allotted {
                    clearing_price,
                    transition,
                }
            }
            Err(error) => {
                tracing::warn!(
                    %step,
                    %error,
                    kind = %error.kind(),
                    retryable = error.is_retryable(),
                    "Bid settlement failed"
                );
                BidSettlement::Failed { step, error }
            }
        };
        BidResult {
            bid: allotted.bid,
            bidder: allotted.bidder,
            settlement,
        }
    }

    async fn run(
        &self,
        closed: &ClosedAuction,
        allotted: &AllottedBid,
        step: &mut SettlementStep,
    ) -> Result<(Decimal, TransitionId)> {
        *step = SettlementStep::Generating;
        let clearing_price = closed.clearing_price().ok_or_else(|| {
            BookbuildError::InvalidTransition {
                reason: format!("{} has no clearing price", closed.auction.record.id),
            }
        })?;

        // Freshness: never build on the revision the allocation saw.
        let current = self.ports.store.bid(allotted.bid).await?;
        if current.record.status == BidStatus::Allotted {
            let allotment = self.ports.store.transaction(current.at.tx).await?;
            if allotment.transition().references == [closed.auction.at] {
                tracing::info!(tx = %current.at.tx, "Bid already allotted");
                return Ok((clearing_price, current.at.tx));
            }
        }
        if current.record.status != BidStatus::Open {
            return Err(BookbuildError::BidNotOpen {
                bid: allotted.bid,
                status: current.record.status,
            });
        }
        if current.record.bidder != allotted.bidder
            || current.record.price != allotted.price
            || current.record.quantity != allotted.quantity
        {
            return Err(BookbuildError::InvalidTransition {
                reason: format!("{} changed since allocation", allotted.bid),
            });
        }

        let proposal = Transition {
            command: Command::AllotBid,
            inputs: vec![current.at],
            references: vec![closed.auction.at],
            outputs: vec![LedgerRecord::Bid(current.record.allotted(clearing_price)?)],
            required_signers: vec![self.key.id(), allotted.bidder],
            valid_until: deadline(self.config.validity_window)?,
        };
        tracing::debug!(tx = %proposal.id(), "Proposal built");

        *step = SettlementStep::Verifying;
        contract::verify_allot(&proposal, &current, &closed.auction)?;

        *step = SettlementStep::Signing;
        let mut signed = proposal.sign(&self.key);

        *step = SettlementStep::GatheringSignatures;
        let cfg = &self.config;
        let mut session = bounded(
            cfg.session_timeout,
            "open session",
            self.ports.network.open_session(allotted.bidder),
        )
        .await?;
        let identities = self
            .ports
            .directory
            .identities_for(&signed.transition.parties());
        bounded(
            cfg.session_timeout,
            "identity sync",
            session.send(SessionMessage::Sync {
                identities,
                dependencies: vec![closed.finalized.clone()],
            }),
        )
        .await?;
        let signature = bounded(
            cfg.signature_timeout,
            "counter-signature",
            session.request_counter_signature(signed.clone()),
        )
        .await?;
        signed.add_signature(signature)?;
        tracing::debug!("Counter-signature collected");

        *step = SettlementStep::Finalising;
        let finalized = bounded(
            cfg.finalize_timeout,
            "finalize",
            self.ports.oracle.finalize(signed),
        )
        .await?;
        finalized.verify(self.ports.oracle.identity())?;

        *step = SettlementStep::Broadcasting;
        if let Err(err) = self.ports.store.record(&finalized).await {
            tracing::warn!(tx = %finalized.id(), error = %err, "Finalized allotment not recorded locally");
        }
        self.notifier
            .notify(&finalized, &closed.auction.record.audience())
            .await;
        self.release(session, &finalized).await;

        Ok((clearing_price, finalized.id()))
    }

    /// Hand the bidder the finalized transition and hold the session until
    /// it acknowledges. The allotment is already final, so a missing ack is
    /// only logged.
    async fn release(&self, mut session: Box<dyn Session>, finalized: &FinalizedTransition) {
        let bidder = session.counterparty();
        let acknowledged = bounded(self.config.ack_timeout, "acknowledgement", async {
            session
                .send(SessionMessage::Finalized(finalized.clone()))
                .await?;
            match session.receive().await? {
                SessionMessage::Ack => Ok(()),
                other => Err(BookbuildError::ProtocolViolation {
                    expected: "Ack",
                    got: other.kind().to_string(),
                }),
            }
        })
        .await;
        if let Err(err) = acknowledged {
            tracing::warn!(%bidder, error = %err, "Bidder did not acknowledge finalized transition");
        }
    }
}

/// `now + window`, the validity deadline of a new proposal.
pub(crate) fn deadline(window: Duration) -> Result<DateTime<Utc>> {
    let window = chrono::Duration::from_std(window)
        .map_err(|e| BookbuildError::Configuration(format!("validity window: {e}")))?;
    Ok(Utc::now() + window)
}

/// Bound a suspension point. Expiry becomes a retryable `Timeout`.
pub(crate) async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BookbuildError::Timeout {
            operation: operation.to_string(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
