//! Settlement configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BookbuildError, Result, constants};

/// Tunables for one settlement orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Maximum number of bid-settlement jobs in flight at once.
    pub worker_limit: usize,
    /// How long a proposed transition stays acceptable to the oracle.
    pub validity_window: Duration,
    /// Bound on opening a session and syncing identities.
    pub session_timeout: Duration,
    /// Bound on waiting for the counterparty signature.
    pub signature_timeout: Duration,
    /// Bound on oracle finalization.
    pub finalize_timeout: Duration,
    /// Bound on waiting for the bidder to acknowledge the finalized transition.
    pub ack_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            worker_limit: constants::DEFAULT_WORKER_LIMIT,
            validity_window: Duration::from_millis(constants::DEFAULT_VALIDITY_WINDOW_MS),
            session_timeout: Duration::from_millis(constants::DEFAULT_SESSION_TIMEOUT_MS),
            signature_timeout: Duration::from_millis(constants::DEFAULT_SIGNATURE_TIMEOUT_MS),
            finalize_timeout: Duration::from_millis(constants::DEFAULT_FINALIZE_TIMEOUT_MS),
            ack_timeout: Duration::from_millis(constants::DEFAULT_ACK_TIMEOUT_MS),
        }
    }
}

impl SettlementConfig {
    /// Reject zero worker limits and zero durations.
    ///
    /// # Errors
    /// Returns [`BookbuildError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.worker_limit == 0 {
            return Err(BookbuildError::Configuration(
                "worker_limit must be at least 1".into(),
            ));
        }
        let durations = [
            ("validity_window", self.validity_window),
            ("session_timeout", self.session_timeout),
            ("signature_timeout", self.signature_timeout),
            ("finalize_timeout", self.finalize_timeout),
            ("ack_timeout", self.ack_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(BookbuildError::Configuration(format!(
                    "{name} must be non-zero"
                )));
            }
        }
        Ok(())
    }

    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `Configuration` if the document is malformed or fails
    /// [`SettlementConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BookbuildError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
