//! Failure classification
//!
//! Turns a raw [`ChainFailure`] into one of a closed set of error kinds, each
//! tagged retryable or terminal. Decision order (first match wins):
//! 1. decodable revert payload
//! 2. revert without payload (failed receipt, or the node said it reverted)
//! 3. signer declined
//! 4. insufficient funds
//! 5. nonce conflict (retryable)
//! 6. transport fault (retryable)
//! 7. anything else

pub mod revert;

pub use revert::RevertDecoder;

use crate::chain::{ChainFailure, FailureSignal};

use serde::Serialize;
use std::fmt;
use thiserror::Error;

const REVERTED_WITHOUT_REASON: &str = "transaction reverted without reason";
const RETRY_LATER: &str = "The ledger is temporarily unavailable, please retry later";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UserRejected,
    InsufficientFunds,
    NonceConflict,
    ContractRevert,
    NetworkError,
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::NonceConflict | ErrorKind::NetworkError)
    }

    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UserRejected => "user_rejected",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::NonceConflict => "nonce_conflict",
            ErrorKind::ContractRevert => "contract_revert",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final, typed outcome of a failed transaction
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub decoded_reason: Option<String>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
            decoded_reason: None,
        }
    }

    fn revert(reason: String) -> Self {
        Self {
            kind: ErrorKind::ContractRevert,
            message: reason.clone(),
            retryable: false,
            decoded_reason: Some(reason),
        }
    }

    /// Rejection for submissions the worker can no longer take
    pub fn coordinator_stopped() -> Self {
        Self::new(ErrorKind::Unknown, "transaction coordinator is not running")
    }

    /// Text suitable for end users: the contract's own reason for reverts,
    /// a generic retry hint for everything else
    pub fn user_message(&self) -> &str {
        match (&self.kind, &self.decoded_reason) {
            (ErrorKind::ContractRevert, Some(reason)) => reason,
            (ErrorKind::ContractRevert, None) => &self.message,
            _ => RETRY_LATER,
        }
    }
}

/// Classify a raw chain failure
pub fn classify(failure: &ChainFailure) -> ClassifiedError {
    // A decodable revert is the most precise signal available and beats any message heuristic
    if let Some(reason) = failure
        .revert_data
        .as_ref()
        .and_then(|data| RevertDecoder::decode(data))
    {
        return ClassifiedError::revert(reason);
    }

    let failed_receipt = failure
        .receipt
        .as_ref()
        .is_some_and(|receipt| !receipt.is_success());
    if failed_receipt || failure.signal == FailureSignal::Reverted {
        return ClassifiedError {
            kind: ErrorKind::ContractRevert,
            message: REVERTED_WITHOUT_REASON.to_string(),
            retryable: false,
            decoded_reason: None,
        };
    }

    let kind = match failure.signal {
        FailureSignal::ActionRejected => ErrorKind::UserRejected,
        FailureSignal::Reverted => ErrorKind::ContractRevert,
        FailureSignal::InsufficientFunds => ErrorKind::InsufficientFunds,
        FailureSignal::NonceConflict => ErrorKind::NonceConflict,
        FailureSignal::Transport => ErrorKind::NetworkError,
        FailureSignal::Unrecognized => ErrorKind::Unknown,
    };

    ClassifiedError::new(kind, failure.message.clone())
}
