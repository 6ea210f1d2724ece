//! Transaction coordinator
//!
//! All writes for one signer go through a single worker task. Callers hold a
//! cheap, cloneable [`TransactionCoordinator`] handle; `submit` only enqueues
//! the call and waits for the worker's verdict. The worker owns the nonce
//! counter outright, so concurrent callers never race on nonces.

mod state;
mod worker;

pub use state::{PendingTransaction, TransactionState};

use crate::chain::{ChainClient, ContractCall, TransactionReceipt};
use crate::classify::ClassifiedError;
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::tx::NonceCounter;
use worker::DispatchWorker;

use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle onto a running dispatch worker
#[derive(Clone)]
pub struct TransactionCoordinator {
    queue: mpsc::Sender<PendingTransaction>,
    chain_id: u64,
    signer: Address,
}

impl TransactionCoordinator {
    /// Read the signer's pending nonce and start the worker.
    ///
    /// The worker runs until every handle is dropped and the queue drains.
    pub async fn spawn(
        client: Arc<dyn ChainClient>,
        config: CoordinatorConfig,
    ) -> CoordinatorResult<(Self, JoinHandle<()>)> {
        let chain_id = client.chain_id();
        let signer = client.signer_address();

        let nonces = NonceCounter::init(client.as_ref())
            .await
            .map_err(|e| CoordinatorError::Nonce {
                signer: format!("{:?}", signer),
                message: e.to_string(),
            })?;

        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let worker = DispatchWorker::new(client, nonces, &config, receiver);
        let handle = tokio::spawn(worker.run());

        info!(
            "Transaction coordinator running for chain {} (max {} attempts, queue capacity {})",
            chain_id, config.max_attempts, config.queue_capacity
        );

        Ok((
            Self {
                queue,
                chain_id,
                signer,
            },
            handle,
        ))
    }

    /// Queue `call` and wait for its final outcome.
    ///
    /// Retryable failures are handled inside the worker; only the last
    /// classified error is returned. Waits for queue space when full.
    pub async fn submit(&self, call: ContractCall) -> Result<TransactionReceipt, ClassifiedError> {
        let (responder, outcome) = oneshot::channel();
        let tx = PendingTransaction::new(call, responder);
        debug!("Queueing transaction {} ({})", tx.id, tx.call);

        crate::metrics::record_tx_submitted(self.chain_id);
        if self.queue.send(tx).await.is_err() {
            crate::metrics::record_dequeued(self.chain_id);
            return Err(ClassifiedError::coordinator_stopped());
        }

        outcome
            .await
            .unwrap_or_else(|_| Err(ClassifiedError::coordinator_stopped()))
    }

    /// Whether the worker is still taking submissions
    pub fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn signer(&self) -> Address {
        self.signer
    }
}
