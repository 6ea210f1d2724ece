//! Ledger transaction coordinator
//!
//! Serializes every contract write for one signing account through a single
//! worker: nonces are assigned in submission order, gas is estimated with a
//! safety margin, transient failures are retried after a nonce resync, and
//! every failure reaches the caller as a typed [`ClassifiedError`].

pub mod api;
pub mod chain;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod service;
pub mod telemetry;
pub mod tx;

pub use chain::{ChainClient, ChainFailure, ContractCall, EthersChainClient, TransactionReceipt};
pub use classify::{classify, ClassifiedError, ErrorKind, RevertDecoder};
pub use config::Settings;
pub use coordinator::TransactionCoordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use service::CoordinatorService;
