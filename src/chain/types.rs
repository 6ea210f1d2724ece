//! Values exchanged with the ledger through [`super::ChainClient`]

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved contract call, as produced by the contract registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Logical contract name (e.g. "HealthRecords")
    pub contract: String,
    /// Method being invoked, used for logs and metrics
    pub method: String,
    /// Deployed contract address
    pub to: Address,
    /// ABI-encoded calldata
    pub data: Bytes,
    /// Native value attached to the call
    pub value: U256,
}

impl ContractCall {
    pub fn new(
        contract: impl Into<String>,
        method: impl Into<String>,
        to: Address,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            contract: contract.into(),
            method: method.into(),
            to,
            data: data.into(),
            value: U256::zero(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

impl fmt::Display for ContractCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.contract, self.method)
    }
}

/// Reference to a broadcast transaction awaiting inclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: H256,
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Failed,
}

/// Inclusion proof for a dispatched transaction. Only built once the chain
/// has confirmed the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub hash: H256,
    pub block_number: u64,
    pub gas_used: u64,
    pub status: ReceiptStatus,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}
