//! The single dispatch worker
//!
//! Drains the submission queue one transaction at a time. Each transaction
//! is estimated, assigned the next nonce, broadcast and awaited before the
//! next one is touched, so the nonce counter is never read concurrently.

use super::state::{PendingTransaction, TransactionState};
use crate::chain::{ChainClient, ChainFailure, TransactionReceipt};
use crate::classify::{classify, ClassifiedError, ErrorKind};
use crate::config::CoordinatorConfig;
use crate::tx::{GasEstimator, NonceCounter};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub(super) struct DispatchWorker {
    client: Arc<dyn ChainClient>,
    nonces: NonceCounter,
    gas: GasEstimator,
    max_attempts: u32,
    retry_delay: Duration,
    queue: mpsc::Receiver<PendingTransaction>,
}

impl DispatchWorker {
    pub(super) fn new(
        client: Arc<dyn ChainClient>,
        nonces: NonceCounter,
        config: &CoordinatorConfig,
        queue: mpsc::Receiver<PendingTransaction>,
    ) -> Self {
        Self {
            client,
            nonces,
            gas: GasEstimator::from_config(config),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            queue,
        }
    }

    /// Process submissions until every coordinator handle is dropped
    pub(super) async fn run(mut self) {
        let chain_id = self.client.chain_id();
        info!(
            "Dispatch worker started for chain {} (signer {:?}, next nonce {})",
            chain_id,
            self.nonces.address(),
            self.nonces.peek()
        );
        crate::metrics::set_next_nonce(chain_id, self.nonces.peek());

        while let Some(tx) = self.queue.recv().await {
            crate::metrics::record_dequeued(chain_id);
            self.process(tx).await;
        }

        info!("Dispatch worker for chain {} stopped: queue closed", chain_id);
    }

    /// Drive one transaction to a terminal state and answer its caller
    async fn process(&mut self, mut tx: PendingTransaction) {
        let chain_id = self.client.chain_id();

        let outcome = loop {
            tx.advance(TransactionState::Estimating);
            crate::metrics::record_tx_attempt(chain_id);

            let err = match self.attempt(&mut tx).await {
                Ok(receipt) => {
                    tx.advance(TransactionState::Confirmed);
                    break Ok(receipt);
                }
                Err(err) => err,
            };

            // Any failure may have consumed or orphaned a nonce
            if let Err(e) = self.nonces.resync(self.client.as_ref()).await {
                warn!("Transaction {}: nonce resync after failure did not complete: {}", tx.id, e);
            }

            if tx.state == TransactionState::Estimating {
                // Only a revert during estimation surfaces here
                tx.advance(TransactionState::Rejected);
                break Err(err);
            }

            if err.retryable && tx.attempt < self.max_attempts {
                warn!(
                    "Transaction {} ({}) attempt {}/{} failed with {}, retrying in {:?}",
                    tx.id, tx.call, tx.attempt, self.max_attempts, err, self.retry_delay
                );
                tx.advance(TransactionState::RetryScheduled);
                crate::metrics::record_retry(chain_id, err.kind);
                tokio::time::sleep(self.retry_delay).await;
                tx.attempt += 1;
                continue;
            }

            tx.advance(TransactionState::Failed);
            break Err(err);
        };

        match &outcome {
            Ok(receipt) => {
                info!(
                    "Transaction {} ({}) confirmed: {:?} in block {} after {} attempt(s)",
                    tx.id, tx.call, receipt.hash, receipt.block_number, tx.attempt
                );
                crate::metrics::record_tx_confirmed(chain_id, tx.age_secs());
            }
            Err(err) => {
                if err.kind == ErrorKind::ContractRevert {
                    warn!("Transaction {} ({}) reverted: {}", tx.id, tx.call, err.message);
                } else {
                    error!(
                        "Transaction {} ({}) failed after {} attempt(s): {}",
                        tx.id, tx.call, tx.attempt, err
                    );
                }
                crate::metrics::record_tx_failed(chain_id, err.kind);
            }
        }

        let id = tx.id;
        if !tx.resolve(outcome) {
            debug!("Caller for transaction {} went away before the outcome", id);
        }
    }

    /// One estimate → allocate → send → wait pass
    async fn attempt(
        &mut self,
        tx: &mut PendingTransaction,
    ) -> Result<TransactionReceipt, ClassifiedError> {
        let client: &dyn ChainClient = self.client.as_ref();

        let gas_limit = self.gas.gas_limit(client, &tx.call).await?;

        tx.advance(TransactionState::Dispatching);
        self.nonces.ensure_synced(client).await.map_err(|e| {
            ClassifiedError::new(
                ErrorKind::NetworkError,
                format!("nonce unavailable: {}", e),
            )
        })?;

        let nonce = self.nonces.allocate();
        crate::metrics::set_next_nonce(client.chain_id(), self.nonces.peek());

        let handle = client
            .send(&tx.call, nonce, gas_limit)
            .await
            .map_err(|f| classify(&f))?;

        tx.advance(TransactionState::Pending);
        info!(
            "Transaction {} ({}) sent: {:?} (nonce {}, gas limit {}, attempt {}/{})",
            tx.id, tx.call, handle.hash, nonce, gas_limit, tx.attempt, self.max_attempts
        );

        let receipt = client
            .await_receipt(handle)
            .await
            .map_err(|f| classify(&f))?;

        if !receipt.is_success() {
            return Err(classify(&ChainFailure::reverted(receipt)));
        }

        Ok(receipt)
    }
}
