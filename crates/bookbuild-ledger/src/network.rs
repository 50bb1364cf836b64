//! Local session network.
//!
//! Each registered party has a responder and a vault. Opening a session to a
//! party creates a pair of tokio channels and spawns that party's responder
//! on the far end. Broadcasting records a finalized transition directly in
//! each participant's vault.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bookbuild_types::{
    BookbuildError, Broadcaster, FinalizedTransition, Network, PartyId, RecordStore, Responder,
    Result, Session, SessionMessage,
};
use tokio::sync::{RwLock, mpsc};

/// Messages buffered per direction before `send` waits.
const CHANNEL_CAPACITY: usize = 16;

/// One end of an in-process session.
pub struct ChannelSession {
    peer: PartyId,
    tx: mpsc::Sender<SessionMessage>,
    rx: mpsc::Receiver<SessionMessage>,
}

impl ChannelSession {
    /// Two connected ends: the first talks to `b`, the second to `a`.
    #[must_use]
    pub fn pair(a: PartyId, b: PartyId) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                peer: b,
                tx: a_tx,
                rx: a_rx,
            },
            Self {
                peer: a,
                tx: b_tx,
                rx: b_rx,
            },
        )
    }
}

#[async_trait]
impl Session for ChannelSession {
    fn counterparty(&self) -> PartyId {
        self.peer
    }

    async fn send(&mut self, message: SessionMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| BookbuildError::SessionClosed { party: self.peer })
    }

    async fn receive(&mut self) -> Result<SessionMessage> {
        self.rx
            .recv()
            .await
            .ok_or(BookbuildError::SessionClosed { party: self.peer })
    }
}

#[derive(Clone)]
struct Node {
    responder: Option<Arc<dyn Responder>>,
    vault: Arc<dyn RecordStore>,
    reachable: bool,
}

/// Registry of parties reachable in this process.
pub struct LocalNetwork {
    /// The party sessions are opened from.
    local: PartyId,
    nodes: Arc<RwLock<HashMap<PartyId, Node>>>,
}

impl LocalNetwork {
    #[must_use]
    pub fn new(local: PartyId) -> Self {
        Self {
            local,
            nodes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The same registry seen from another party.
    #[must_use]
    pub fn as_party(&self, local: PartyId) -> Self {
        Self {
            local,
            nodes: Arc::clone(&self.nodes),
        }
    }

    /// Register a party's vault and, if it accepts sessions, its responder.
    pub async fn register(
        &self,
        party: PartyId,
        vault: Arc<dyn RecordStore>,
        responder: Option<Arc<dyn Responder>>,
    ) {
        self.nodes.write().await.insert(
            party,
            Node {
                responder,
                vault,
                reachable: true,
            },
        );
    }

    /// Replace the responder a party runs for inbound sessions.
    pub async fn set_responder(&self, party: PartyId, responder: Arc<dyn Responder>) {
        if let Some(node) = self.nodes.write().await.get_mut(&party) {
            node.responder = Some(responder);
        }
    }

    /// Mark a party (un)reachable for sessions and broadcasts.
    pub async fn set_reachable(&self, party: PartyId, reachable: bool) {
        if let Some(node) = self.nodes.write().await.get_mut(&party) {
            node.reachable = reachable;
        }
    }

    async fn node(&self, party: PartyId) -> Option<Node> {
        self.nodes
            .read()
            .await
            .get(&party)
            .filter(|n| n.reachable)
            .cloned()
    }
}

#[async_trait]
impl Network for LocalNetwork {
    async fn open_session(&self, party: PartyId) -> Result<Box<dyn Session>> {
        let responder = self
            .node(party)
            .await
            .and_then(|n| n.responder)
            .ok_or(BookbuildError::PartyUnreachable(party))?;

        let (near, far) = ChannelSession::pair(self.local, party);
        let initiator = self.local;
        tokio::spawn(async move {
            if let Err(err) = responder.respond(Box::new(far)).await {
                tracing::warn!(
                    party = %party,
                    initiator = %initiator,
                    error = %err,
                    "Responder finished with error"
                );
            }
        });
        Ok(Box::new(near))
    }
}

#[async_trait]
impl Broadcaster for LocalNetwork {
    async fn broadcast(
        &self,
        finalized: &FinalizedTransition,
        participants: &[PartyId],
    ) -> Result<usize> {
        let mut delivered = 0;
        for party in participants {
            let Some(node) = self.node(*party).await else {
                tracing::warn!(party = %party, tx = %finalized.id(), "Broadcast target unreachable");
                continue;
            };
            match node.vault.record(finalized).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(party = %party, tx = %finalized.id(), error = %err, "Broadcast delivery failed");
                }
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use bookbuild_types::{AuctionRecord, LedgerRecord, PartyKey};
    use rust_decimal::Decimal;

    use super::*;
    use crate::{InMemoryNotary, InMemoryVault};

    /// Replies `Ack` to every message until the initiator hangs up.
    struct Echo;

    #[async_trait]
    impl Responder for Echo {
        async fn respond(&self, mut session: Box<dyn Session>) -> Result<()> {
            while session.receive().await.is_ok() {
                session.send(SessionMessage::Ack).await?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn channel_pair_delivers_both_ways() {
        let (mut a, mut b) = ChannelSession::pair(PartyId([1; 32]), PartyId([2; 32]));
        assert_eq!(a.counterparty(), PartyId([2; 32]));
        assert_eq!(b.counterparty(), PartyId([1; 32]));
        a.send(SessionMessage::Ack).await.unwrap();
        assert_eq!(b.receive().await.unwrap(), SessionMessage::Ack);
        b.send(SessionMessage::Declined { reason: "no".into() }).await.unwrap();
        assert_eq!(a.receive().await.unwrap().kind(), "Declined");
    }

    #[tokio::test]
    async fn dropped_peer_reports_session_closed() {
        let (mut a, b) = ChannelSession::pair(PartyId([1; 32]), PartyId([2; 32]));
        drop(b);
        let err = a.receive().await.unwrap_err();
        assert!(matches!(err, BookbuildError::SessionClosed { party } if party == PartyId([2; 32])));
        assert!(a.send(SessionMessage::Ack).await.is_err());
    }

    #[tokio::test]
    async fn session_reaches_registered_responder() {
        let owner = PartyId([1; 32]);
        let bidder = PartyId([2; 32]);
        let net = LocalNetwork::new(owner);
        net.register(bidder, Arc::new(InMemoryVault::new(bidder)), Some(Arc::new(Echo)))
            .await;

        let mut session = net.open_session(bidder).await.unwrap();
        session.send(SessionMessage::Ack).await.unwrap();
        assert_eq!(session.receive().await.unwrap(), SessionMessage::Ack);
    }

    #[tokio::test]
    async fn unreachable_party() {
        let owner = PartyId([1; 32]);
        let bidder = PartyId([2; 32]);
        let net = LocalNetwork::new(owner);
        assert!(matches!(
            net.open_session(bidder).await.err(),
            Some(BookbuildError::PartyUnreachable(p)) if p == bidder
        ));

        net.register(bidder, Arc::new(InMemoryVault::new(bidder)), Some(Arc::new(Echo)))
            .await;
        net.set_reachable(bidder, false).await;
        assert!(net.open_session(bidder).await.is_err());
    }

    #[tokio::test]
    async fn broadcast_records_in_reachable_vaults() {
        let owner = PartyKey::from_seed([1; 32]);
        let observer = PartyId([3; 32]);
        let offline = PartyId([4; 32]);
        let net = LocalNetwork::new(owner.id());
        let vault = Arc::new(InMemoryVault::new(observer));
        net.register(observer, vault.clone(), None).await;
        net.register(offline, Arc::new(InMemoryVault::new(offline)), None).await;
        net.set_reachable(offline, false).await;

        let notary = InMemoryNotary::new(PartyKey::from_seed([9; 32]));
        let auction = AuctionRecord::dummy(owner.id(), Decimal::TEN, vec![observer, offline]);
        let ftx = notary
            .issue(vec![LedgerRecord::Auction(auction.clone())], &owner)
            .await
            .unwrap();

        let delivered = net
            .broadcast(&ftx, &[observer, offline, PartyId([5; 32])])
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert!(vault.has_recorded(&ftx.id()).await);
        assert_eq!(vault.auction(auction.id).await.unwrap().record, auction);
    }
}
