//! Error types for coordinator start-up and wiring
//!
//! Per-transaction outcomes are reported as [`crate::classify::ClassifiedError`];
//! this enum covers everything that can go wrong before a transaction is queued.

use thiserror::Error;

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Nonce error for signer {signer}: {message}")]
    Nonce { signer: String, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    /// Check if the failure could clear up on its own (e.g. node restarting)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::ChainConnection { .. } | CoordinatorError::Nonce { .. }
        )
    }
}

/// Result type for coordinator wiring operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
