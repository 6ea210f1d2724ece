//! Chain module - the coordinator's only window onto the ledger
//!
//! This module provides:
//! - The `ChainClient` transport abstraction (no retry logic lives here)
//! - `ChainFailure`, the structured failure every client method reports
//! - An ethers-backed client with multi-RPC failover and a local signer

pub mod provider;
pub mod signals;
pub mod types;

pub use provider::EthersChainClient;
pub use types::{ContractCall, ReceiptStatus, TransactionReceipt, TxHandle};

use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use std::fmt;

/// Narrow transport interface onto the ledger RPC endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain ID this client is connected to
    fn chain_id(&self) -> u64;

    /// Address of the signing account
    fn signer_address(&self) -> Address;

    /// Next nonce for `address`, counting transactions still in the mempool
    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainFailure>;

    /// Estimate gas for a call from the signer
    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64, ChainFailure>;

    /// Sign and broadcast `call` with an explicit nonce and gas limit
    async fn send(
        &self,
        call: &ContractCall,
        nonce: u64,
        gas_limit: u64,
    ) -> Result<TxHandle, ChainFailure>;

    /// Wait for a broadcast transaction to be included
    async fn await_receipt(&self, handle: TxHandle) -> Result<TransactionReceipt, ChainFailure>;
}

/// What the adapter could tell about a failure before classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSignal {
    /// Signer declined to sign
    ActionRejected,
    /// Execution reverted, with or without a payload
    Reverted,
    /// Account cannot cover gas * price + value
    InsufficientFunds,
    /// Nonce stale, too high, already known, or replacement underpriced
    NonceConflict,
    /// Timeout, connectivity or rate limiting
    Transport,
    Unrecognized,
}

/// Raw failure from estimation, broadcast or receipt wait
#[derive(Debug, Clone, PartialEq)]
pub struct ChainFailure {
    pub signal: FailureSignal,
    pub message: String,
    /// ABI-encoded revert payload, when the node returned one
    pub revert_data: Option<Bytes>,
    /// Receipt of a mined-but-failed transaction
    pub receipt: Option<TransactionReceipt>,
}

impl ChainFailure {
    pub fn new(signal: FailureSignal, message: impl Into<String>) -> Self {
        Self {
            signal,
            message: message.into(),
            revert_data: None,
            receipt: None,
        }
    }

    /// Build a failure from an RPC error code and message, running the
    /// adapter heuristics to find the signal
    pub fn from_rpc(code: Option<i64>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(signals::detect(code, &message), message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureSignal::Transport, message)
    }

    /// A transaction that was mined with a failure status
    pub fn reverted(receipt: TransactionReceipt) -> Self {
        Self {
            signal: FailureSignal::Reverted,
            message: format!("transaction {:?} reverted in block {}", receipt.hash, receipt.block_number),
            revert_data: None,
            receipt: Some(receipt),
        }
    }

    pub fn with_revert_data(mut self, data: impl Into<Bytes>) -> Self {
        self.revert_data = Some(data.into());
        self
    }
}

impl fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ChainFailure {}
