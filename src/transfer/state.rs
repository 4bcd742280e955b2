//! Transfer attempt FSM
//!
//! Tracks where one coordinator call is in its unit of work. Transitions are
//! emitted as tracing events; nothing is persisted.

use std::fmt;

/// Transfer FSM States
///
/// Terminal states: COMMITTED, ABORTED_FATAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Preconditions checked before any unit is opened
    Validating,

    /// Taking row locks in ascending account id order
    Locking,

    /// Balances adjusted, transfer and entries appended (all staged)
    Mutating,

    /// Commit in flight
    Committing,

    /// Terminal: all rows durable
    Committed,

    /// Unit aborted on a transient conflict; next hop is LOCKING
    AbortedRetryable,

    /// Terminal: unit aborted, nothing written
    AbortedFatal,
}

impl TransferState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Committed | TransferState::AbortedFatal
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Validating, Locking)
                | (Validating, AbortedFatal)
                | (Locking, Mutating)
                | (Mutating, Committing)
                | (Committing, Committed)
                | (Locking | Mutating | Committing, AbortedRetryable)
                | (Locking | Mutating | Committing, AbortedFatal)
                | (AbortedRetryable, Locking)
                | (AbortedRetryable, AbortedFatal)
        )
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Validating => "VALIDATING",
            TransferState::Locking => "LOCKING",
            TransferState::Mutating => "MUTATING",
            TransferState::Committing => "COMMITTING",
            TransferState::Committed => "COMMITTED",
            TransferState::AbortedRetryable => "ABORTED_RETRYABLE",
            TransferState::AbortedFatal => "ABORTED_FATAL",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
