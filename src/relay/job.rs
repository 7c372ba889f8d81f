use alloy_primitives::TxHash;
use std::fmt;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::protocol::{AttestationRecord, CrossChainMessage};

/// Lifecycle of a [`RelayJob`].
///
/// ```text
/// Observed → AttestationPending → AttestationReady → Submitting → Confirmed
///     └──────────────┴──────────────────┴──────────────┴─→ Failed | DuplicateSkipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Observed,
    AttestationPending,
    AttestationReady,
    Submitting,
    Confirmed,
    Failed,
    DuplicateSkipped,
}

impl JobState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::DuplicateSkipped)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Observed => "observed",
            Self::AttestationPending => "attestation_pending",
            Self::AttestationReady => "attestation_ready",
            Self::Submitting => "submitting",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::DuplicateSkipped => "duplicate_skipped",
        }
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;

        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed | DuplicateSkipped) => true,
            (Observed, AttestationPending)
            | (AttestationPending, AttestationReady)
            | (AttestationReady, Submitting)
            | (Submitting, Confirmed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a job's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: JobState,
    pub to: JobState,
    /// Attempts spent in `from` before leaving it
    pub attempts: u32,
}

/// A routed message being driven to its destination.
#[derive(Debug, Clone)]
pub struct RelayJob {
    pub message: CrossChainMessage,
    pub source_tx_hash: TxHash,
    pub attestation: Option<AttestationRecord>,
    pub destination_tx_hash: Option<TxHash>,
    state: JobState,
    attempts: u32,
    last_error: Option<String>,
    history: Vec<Transition>,
    pub(crate) holds_claim: bool,
}

impl RelayJob {
    pub fn new(message: CrossChainMessage, source_tx_hash: TxHash) -> Self {
        Self {
            message,
            source_tx_hash,
            attestation: None,
            destination_tx_hash: None,
            state: JobState::Observed,
            attempts: 0,
            last_error: None,
            history: Vec::new(),
            holds_claim: false,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Failed attempts in the current state.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// States visited so far, starting with `Observed`.
    pub fn path(&self) -> Vec<JobState> {
        std::iter::once(JobState::Observed)
            .chain(self.history.iter().map(|t| t.to))
            .collect()
    }

    /// Move to `next`. Returns `false`, leaving the job untouched, if the
    /// state machine has no such edge; terminal states are never left.
    pub(crate) fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                from = %self.state,
                to = %next,
                nonce = %self.message.nonce,
                event = "relay_job_transition_rejected"
            );
            return false;
        }

        debug!(
            from = %self.state,
            to = %next,
            attempts = self.attempts,
            event = "relay_job_transition"
        );
        self.history.push(Transition {
            from: self.state,
            to: next,
            attempts: self.attempts,
        });
        self.state = next;
        self.attempts = 0;
        true
    }

    /// Count a failed attempt in the current state.
    pub(crate) fn record_error(&mut self, error: &RelayError) {
        self.attempts += 1;
        self.note_error(error);
    }

    pub(crate) fn note_error(&mut self, error: &RelayError) {
        self.last_error = Some(error.to_string());
    }
}
