//! Broadcast notifier.
//!
//! Observers learn outcomes after the fact. Delivery is best effort and
//! outside the atomicity guarantee: a failed broadcast is logged, never
//! propagated into the settlement result.

use std::sync::Arc;

use bookbuild_types::{Broadcaster, FinalizedTransition, PartyId};

pub struct BroadcastNotifier {
    broadcaster: Arc<dyn Broadcaster>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Send `finalized` to `audience`. Returns how many recorded it.
    pub async fn notify(&self, finalized: &FinalizedTransition, audience: &[PartyId]) -> usize {
        match self.broadcaster.broadcast(finalized, audience).await {
            Ok(delivered) => {
                if delivered < audience.len() {
                    tracing::warn!(
                        tx = %finalized.id(),
                        delivered,
                        audience = audience.len(),
                        "Broadcast partially delivered"
                    );
                } else {
                    tracing::debug!(tx = %finalized.id(), delivered, "Broadcast delivered");
                }
                delivered
            }
            Err(err) => {
                tracing::warn!(tx = %finalized.id(), error = %err, "Broadcast failed");
                0
            }
        }
    }
}
