//! Queued transactions and their lifecycle

use crate::chain::{ContractCall, TransactionReceipt};
use crate::classify::ClassifiedError;

use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// Channel the worker resolves once a transaction reaches a terminal state
pub type Responder = oneshot::Sender<Result<TransactionReceipt, ClassifiedError>>;

/// Per-transaction lifecycle.
///
/// `Queued → Estimating → {Rejected | Dispatching} → Pending →
/// {Confirmed | RetryScheduled → Estimating | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Queued,
    Estimating,
    /// Estimation proved the call reverts; nothing was dispatched
    Rejected,
    Dispatching,
    /// Broadcast, waiting for inclusion
    Pending,
    Confirmed,
    RetryScheduled,
    Failed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Rejected | TransactionState::Confirmed | TransactionState::Failed
        )
    }

    /// Whether `next` is a legal successor
    pub fn can_advance_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;

        matches!(
            (self, next),
            (Queued, Estimating)
                | (Estimating, Rejected)
                | (Estimating, Dispatching)
                // a broadcast that never reached the node fails before Pending
                | (Dispatching, Pending)
                | (Dispatching, RetryScheduled)
                | (Dispatching, Failed)
                | (Pending, Confirmed)
                | (Pending, RetryScheduled)
                | (Pending, Failed)
                | (RetryScheduled, Estimating)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Queued => "queued",
            TransactionState::Estimating => "estimating",
            TransactionState::Rejected => "rejected",
            TransactionState::Dispatching => "dispatching",
            TransactionState::Pending => "pending",
            TransactionState::Confirmed => "confirmed",
            TransactionState::RetryScheduled => "retry_scheduled",
            TransactionState::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submission owned by the coordinator's queue until resolved
#[derive(Debug)]
pub struct PendingTransaction {
    /// Log correlation id
    pub id: Uuid,
    pub call: ContractCall,
    /// 1-based attempt number
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub state: TransactionState,
    responder: Responder,
}

impl PendingTransaction {
    pub fn new(call: ContractCall, responder: Responder) -> Self {
        Self {
            id: Uuid::new_v4(),
            call,
            attempt: 1,
            enqueued_at: Utc::now(),
            state: TransactionState::Queued,
            responder,
        }
    }

    /// Move to `next`, logging the transition
    pub fn advance(&mut self, next: TransactionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(
            "Transaction {} ({}) {} -> {} (attempt {})",
            self.id, self.call, self.state, next, self.attempt
        );
        self.state = next;
    }

    /// Hand the outcome back to the caller. Returns false if the caller
    /// stopped waiting.
    pub fn resolve(self, outcome: Result<TransactionReceipt, ClassifiedError>) -> bool {
        self.responder.send(outcome).is_ok()
    }

    /// Seconds since submission
    pub fn age_secs(&self) -> f64 {
        (Utc::now() - self.enqueued_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    #[test]
    fn test_happy_path_transitions() {
        use TransactionState::*;
        let path = [Queued, Estimating, Dispatching, Pending, Confirmed];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Confirmed.is_terminal());
    }

    #[test]
    fn test_retry_loop_transitions() {
        use TransactionState::*;
        assert!(Pending.can_advance_to(RetryScheduled));
        assert!(RetryScheduled.can_advance_to(Estimating));
        assert!(Estimating.can_advance_to(Rejected));
        assert!(Rejected.is_terminal());
    }

    #[test]
    fn test_illegal_transitions() {
        use TransactionState::*;
        assert!(!Queued.can_advance_to(Dispatching));
        assert!(!Confirmed.can_advance_to(RetryScheduled));
        assert!(!Rejected.can_advance_to(Estimating));
        assert!(!RetryScheduled.can_advance_to(Dispatching));
        assert!(!Failed.can_advance_to(Estimating));
    }

    #[tokio::test]
    async fn test_resolve_reports_dropped_caller() {
        let call = ContractCall::new("Consents", "grant", Address::zero(), Vec::<u8>::new());

        let (tx, rx) = oneshot::channel();
        let pending = PendingTransaction::new(call.clone(), tx);
        assert_eq!(pending.attempt, 1);
        assert_eq!(pending.state, TransactionState::Queued);
        drop(rx);
        assert!(!pending.resolve(Err(ClassifiedError::coordinator_stopped())));

        let (tx, rx) = oneshot::channel();
        let pending = PendingTransaction::new(call, tx);
        assert!(pending.resolve(Err(ClassifiedError::coordinator_stopped())));
        assert!(rx.await.unwrap().is_err());
    }
}
