//! Interfaces to the collaborators settlement runs against.
//!
//! Storage, sequencing, transport and fan-out are external services. The
//! settlement plane only sees them through these traits; `bookbuild-ledger`
//! provides in-memory implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    AuctionRecord, AuctionRef, BidRecord, BidRef, BookbuildError, FinalizedTransition, PartyId,
    PartyIdentity, PartySignature, RecordRef, Result, SignedTransition, StateAndRef, TransitionId,
};

/// Query access to a party's view of the ledger.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Current revision of an auction.
    ///
    /// # Errors
    /// `AuctionNotFound` if the auction is unknown to this party.
    async fn auction(&self, auction: AuctionRef) -> Result<StateAndRef<AuctionRecord>>;

    /// Current revisions of the auction's OPEN bids, in first-issued order.
    async fn open_bids(&self, auction: AuctionRef) -> Result<Vec<StateAndRef<BidRecord>>>;

    /// Current revisions of every bid against the auction, in first-issued order.
    async fn bids(&self, auction: AuctionRef) -> Result<Vec<StateAndRef<BidRecord>>>;

    /// Current revision of one bid.
    ///
    /// # Errors
    /// `BidNotFound` if the bid is unknown to this party.
    async fn bid(&self, bid: BidRef) -> Result<StateAndRef<BidRecord>>;

    /// A finalized transition this party has recorded.
    ///
    /// # Errors
    /// `TransitionNotFound` if it was never recorded here.
    async fn transaction(&self, id: TransitionId) -> Result<FinalizedTransition>;

    /// Record a finalized transition. Recording the same transition twice is a no-op.
    async fn record(&self, finalized: &FinalizedTransition) -> Result<()>;
}

/// The notary: sole arbiter of which revision is current.
#[async_trait]
pub trait SequencingOracle: Send + Sync {
    /// Key the oracle signs finality with.
    fn identity(&self) -> PartyId;

    /// Sequence a fully signed transition.
    ///
    /// # Errors
    /// - `InputConsumed` / `ReferenceStale` / `TransitionExpired` on conflicts
    /// - `RecordNotFound` for revisions the oracle never finalized
    /// - 3xx signature errors
    async fn finalize(&self, signed: SignedTransition) -> Result<FinalizedTransition>;

    /// The transition that consumed `record`, or `None` while it is current.
    async fn consumed_by(&self, record: RecordRef) -> Result<Option<TransitionId>>;

    /// A transition this oracle finalized.
    ///
    /// # Errors
    /// `TransitionNotFound` if the oracle never finalized `id`.
    async fn transaction(&self, id: TransitionId) -> Result<FinalizedTransition>;
}

/// Messages exchanged over a settlement session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMessage {
    /// Identities of every party in the proposal plus the finalized
    /// transitions it depends on.
    Sync {
        identities: Vec<PartyIdentity>,
        dependencies: Vec<FinalizedTransition>,
    },
    /// Partially signed proposal awaiting a counter-signature.
    Propose(SignedTransition),
    CounterSigned(PartySignature),
    Declined { reason: String },
    Finalized(FinalizedTransition),
    /// The finalized transition has been recorded.
    Ack,
}

impl SessionMessage {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync { .. } => "Sync",
            Self::Propose(_) => "Propose",
            Self::CounterSigned(_) => "CounterSigned",
            Self::Declined { .. } => "Declined",
            Self::Finalized(_) => "Finalized",
            Self::Ack => "Ack",
        }
    }
}

/// One end of a point-to-point session.
#[async_trait]
pub trait Session: Send {
    fn counterparty(&self) -> PartyId;

    async fn send(&mut self, message: SessionMessage) -> Result<()>;

    /// Wait for the next message.
    ///
    /// # Errors
    /// `SessionClosed` once the peer has hung up.
    async fn receive(&mut self) -> Result<SessionMessage>;

    /// Send `proposal` and wait for the counterparty's decision.
    ///
    /// # Errors
    /// - `SignatureDeclined` with the counterparty's reason
    /// - `SignatureInvalid` if the returned signature is not the counterparty's
    /// - `ProtocolViolation` for any other reply
    async fn request_counter_signature(
        &mut self,
        proposal: SignedTransition,
    ) -> Result<PartySignature> {
        let party = self.counterparty();
        self.send(SessionMessage::Propose(proposal)).await?;
        match self.receive().await? {
            SessionMessage::CounterSigned(sig) if sig.by == party => Ok(sig),
            SessionMessage::CounterSigned(sig) => {
                Err(BookbuildError::SignatureInvalid { party: sig.by })
            }
            SessionMessage::Declined { reason } => {
                Err(BookbuildError::SignatureDeclined { party, reason })
            }
            other => Err(BookbuildError::ProtocolViolation {
                expected: "CounterSigned or Declined",
                got: other.kind().to_string(),
            }),
        }
    }
}

/// Outbound sessions.
#[async_trait]
pub trait Network: Send + Sync {
    /// # Errors
    /// `PartyUnreachable` if no route to `party` exists.
    async fn open_session(&self, party: PartyId) -> Result<Box<dyn Session>>;
}

/// Handler a node runs for every inbound session.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, session: Box<dyn Session>) -> Result<()>;
}

/// Best-effort fan-out of finalized transitions to observers.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Returns how many participants recorded the transition.
    async fn broadcast(
        &self,
        finalized: &FinalizedTransition,
        participants: &[PartyId],
    ) -> Result<usize>;
}
