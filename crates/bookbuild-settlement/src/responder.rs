//! Bidder side of the per-bid commit protocol.
//!
//! A bidder counter-signs only an allotment of its own current OPEN bid,
//! against a closure it has verified with the oracle, at the offer it made.
//! Anything else is declined with a reason.

use std::sync::Arc;

use async_trait::async_trait;
use bookbuild_types::{
    AuctionRecord, BookbuildError, Command, FinalizedTransition, LedgerRecord, PartyId,
    PartyIdentity, PartyKey, RecordStore, Responder, Result, Session, SessionMessage,
    SignedTransition, StateAndRef,
};
use chrono::Utc;
use rust_decimal::Decimal;

use crate::contract;

pub struct BidderResponder {
    key: PartyKey,
    store: Arc<dyn RecordStore>,
    /// Identity finality signatures are checked against.
    oracle: PartyId,
    price_ceiling: Option<Decimal>,
}

impl BidderResponder {
    #[must_use]
    pub fn new(key: PartyKey, store: Arc<dyn RecordStore>, oracle: PartyId) -> Self {
        Self {
            key,
            store,
            oracle,
            price_ceiling: None,
        }
    }

    /// Decline any allotment whose clearing price exceeds `ceiling`.
    #[must_use]
    pub fn with_price_ceiling(mut self, ceiling: Decimal) -> Self {
        self.price_ceiling = Some(ceiling);
        self
    }

    #[must_use]
    pub fn party(&self) -> PartyId {
        self.key.id()
    }

    /// Verify and record the closures a proposal depends on.
    async fn accept_dependencies(
        &self,
        dependencies: Vec<FinalizedTransition>,
    ) -> Result<Vec<StateAndRef<AuctionRecord>>> {
        let mut closures = Vec::with_capacity(dependencies.len());
        for finalized in dependencies {
            finalized.verify(self.oracle)?;
            self.store.record(&finalized).await?;
            closures.extend(finalized.auction_output());
        }
        Ok(closures)
    }

    async fn review(
        &self,
        owner: PartyId,
        proposal: &SignedTransition,
        identities: &[PartyIdentity],
        closures: &[StateAndRef<AuctionRecord>],
    ) -> Result<()> {
        let tx = &proposal.transition;
        if tx.command != Command::AllotBid {
            return Err(BookbuildError::InvalidTransition {
                reason: format!("expected ALLOT_BID, got {}", tx.command),
            });
        }
        if !tx.is_valid_at(Utc::now()) {
            return Err(BookbuildError::TransitionExpired {
                valid_until: tx.valid_until,
            });
        }

        let Some(LedgerRecord::Bid(output)) = tx.outputs.first() else {
            return Err(BookbuildError::InvalidTransition {
                reason: "proposal allots no bid".into(),
            });
        };
        let current = self.store.bid(output.id).await?;
        if current.record.bidder != self.key.id() {
            return Err(BookbuildError::InvalidTransition {
                reason: format!("{} is not ours", output.id),
            });
        }

        let closed = closures
            .iter()
            .find(|c| tx.references == [c.at])
            .ok_or_else(|| BookbuildError::InvalidTransition {
                reason: "proposal references no verified closure".into(),
            })?;
        if closed.record.owner != owner {
            return Err(BookbuildError::NotAuctionOwner {
                auction: closed.record.id,
                caller: owner,
            });
        }
        contract::verify_allot(tx, &current, closed)?;

        let id = proposal.id();
        proposal
            .signatures
            .iter()
            .find(|s| s.by == owner)
            .ok_or(BookbuildError::SignatureMissing { party: owner })?
            .verify(id.as_bytes())?;

        if let Some(unknown) = tx
            .parties()
            .into_iter()
            .find(|p| !identities.iter().any(|i| i.id == *p))
        {
            return Err(BookbuildError::InvalidTransition {
                reason: format!("no identity for {unknown}"),
            });
        }

        let above_ceiling = self
            .price_ceiling
            .zip(output.clearing_price)
            .filter(|(ceiling, cp)| cp > ceiling);
        if let Some((ceiling, cp)) = above_ceiling {
            return Err(BookbuildError::InvalidTransition {
                reason: format!("clearing price {cp} above ceiling {ceiling}"),
            });
        }
        Ok(())
    }
}

fn unexpected(expected: &'static str, got: &SessionMessage) -> BookbuildError {
    BookbuildError::ProtocolViolation {
        expected,
        got: got.kind().to_string(),
    }
}

#[async_trait]
impl Responder for BidderResponder {
    async fn respond(&self, mut session: Box<dyn Session>) -> Result<()> {
        let owner = session.counterparty();

        let (identities, closures) = match session.receive().await? {
            SessionMessage::Sync {
                identities,
                dependencies,
            } => (identities, self.accept_dependencies(dependencies).await?),
            other => return Err(unexpected("Sync", &other)),
        };
        let proposal = match session.receive().await? {
            SessionMessage::Propose(proposal) => proposal,
            other => return Err(unexpected("Propose", &other)),
        };

        let id = proposal.id();
        if let Err(err) = self.review(owner, &proposal, &identities, &closures).await {
            tracing::warn!(party = %self.key.id(), tx = %id, %owner, error = %err, "Declining allotment");
            return session
                .send(SessionMessage::Declined {
                    reason: err.to_string(),
                })
                .await;
        }
        tracing::info!(party = %self.key.id(), tx = %id, "Counter-signing allotment");
        session
            .send(SessionMessage::CounterSigned(self.key.sign(id.as_bytes())))
            .await?;

        match session.receive().await? {
            SessionMessage::Finalized(finalized) if finalized.id() == id => {
                finalized.verify(self.oracle)?;
                self.store.record(&finalized).await?;
                session.send(SessionMessage::Ack).await
            }
            other => Err(unexpected("Finalized", &other)),
        }
    }
}
