//! In-memory sequencing oracle.
//!
//! Like a UTXO set: every revision the notary has finalized is either current
//! or consumed by exactly one later transition. Finalization is checked and
//! applied under one lock, so two transitions racing for the same input see
//! a single winner.
//!
//! An identical resubmission of a finalized transition returns the existing
//! finality, whatever the clock says. Anything else is checked, in order:
//! 1. Validity window (`TransitionExpired`)
//! 2. Every required signer has a valid signature
//! 3. Inputs are known (`RecordNotFound`) and unconsumed (`InputConsumed`)
//! 4. References are known and still current (`ReferenceStale`)
//!
//! The notary is non-validating: contract rules are the parties' concern.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use async_trait::async_trait;
use bookbuild_types::{
    BookbuildError, Command, FinalizedTransition, LedgerRecord, PartyId, PartyKey, RecordRef,
    Result, SequencingOracle, SignedTransition, Transition, TransitionId, constants,
};
use chrono::Utc;
use tokio::sync::Mutex;

#[derive(Default)]
struct NotaryState {
    /// Next sequence number to assign.
    sequence: u64,
    /// Every revision produced by a finalized transition.
    produced: HashSet<RecordRef>,
    /// Consumed revision → the transition that consumed it.
    consumed: HashMap<RecordRef, TransitionId>,
    finalized: HashMap<TransitionId, FinalizedTransition>,
}

/// Single-node notary holding the consumed-revision set in memory.
pub struct InMemoryNotary {
    key: PartyKey,
    state: Mutex<NotaryState>,
    /// Artificial delay before each finalization.
    latency: Option<Duration>,
}

impl InMemoryNotary {
    #[must_use]
    pub fn new(key: PartyKey) -> Self {
        Self {
            key,
            state: Mutex::new(NotaryState::default()),
            latency: None,
        }
    }

    /// Delay every finalization by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Finalize genesis records signed by `issuer`.
    ///
    /// # Errors
    /// Propagates finalization errors.
    pub async fn issue(
        &self,
        outputs: Vec<LedgerRecord>,
        issuer: &PartyKey,
    ) -> Result<FinalizedTransition> {
        let valid_for = chrono::Duration::milliseconds(
            i64::try_from(constants::DEFAULT_VALIDITY_WINDOW_MS).unwrap_or(i64::MAX),
        );
        let transition = Transition {
            command: Command::Issue,
            inputs: Vec::new(),
            references: Vec::new(),
            outputs,
            required_signers: vec![issuer.id()],
            valid_until: Utc::now() + valid_for,
        };
        self.finalize(transition.sign(issuer)).await
    }

    /// Number of transitions finalized so far.
    pub async fn finalized_count(&self) -> usize {
        self.state.lock().await.finalized.len()
    }

    fn check(state: &NotaryState, transition: &Transition) -> Result<()> {
        if u32::try_from(transition.outputs.len()).is_err() {
            return Err(BookbuildError::InvalidTransition {
                reason: "too many outputs".into(),
            });
        }
        let mut seen = HashSet::new();
        for input in &transition.inputs {
            if !seen.insert(*input) {
                return Err(BookbuildError::InvalidTransition {
                    reason: format!("input {input} listed twice"),
                });
            }
            if let Some(by) = state.consumed.get(input) {
                return Err(BookbuildError::InputConsumed {
                    record: *input,
                    consumed_by: *by,
                });
            }
            if !state.produced.contains(input) {
                return Err(BookbuildError::RecordNotFound(*input));
            }
        }
        for reference in &transition.references {
            if state.consumed.contains_key(reference) {
                return Err(BookbuildError::ReferenceStale { record: *reference });
            }
            if !state.produced.contains(reference) {
                return Err(BookbuildError::RecordNotFound(*reference));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SequencingOracle for InMemoryNotary {
    fn identity(&self) -> PartyId {
        self.key.id()
    }

    async fn finalize(&self, signed: SignedTransition) -> Result<FinalizedTransition> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let id = signed.id();
        let mut state = self.state.lock().await;
        if let Some(done) = state.finalized.get(&id) {
            return Ok(done.clone());
        }

        let now = Utc::now();
        if !signed.transition.is_valid_at(now) {
            tracing::debug!(tx = %id, valid_until = %signed.transition.valid_until, "Rejecting expired transition");
            return Err(BookbuildError::TransitionExpired {
                valid_until: signed.transition.valid_until,
            });
        }
        signed.verify_signatures()?;

        if let Err(err) = Self::check(&state, &signed.transition) {
            tracing::debug!(tx = %id, command = %signed.transition.command, error = %err, "Notarisation refused");
            return Err(err);
        }

        for input in &signed.transition.inputs {
            state.consumed.insert(*input, id);
        }

        let sequence = state.sequence;
        state.sequence += 1;
        let oracle_signature = self
            .key
            .sign(&FinalizedTransition::finality_payload(&id, sequence));
        let finalized = FinalizedTransition {
            signed,
            sequence,
            finalized_at: now,
            oracle_signature,
        };
        state.produced.extend(finalized.outputs().map(|(at, _)| at));
        state.finalized.insert(id, finalized.clone());

        tracing::debug!(
            tx = %id,
            sequence,
            command = %finalized.transition().command,
            "Transition finalized"
        );
        Ok(finalized)
    }

    async fn consumed_by(&self, record: RecordRef) -> Result<Option<TransitionId>> {
        Ok(self.state.lock().await.consumed.get(&record).copied())
    }

    async fn transaction(&self, id: TransitionId) -> Result<FinalizedTransition> {
        self.state
            .lock()
            .await
            .finalized
            .get(&id)
            .cloned()
            .ok_or(BookbuildError::TransitionNotFound(id))
    }
}
