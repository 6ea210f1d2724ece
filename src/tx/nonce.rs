//! Nonce management for the single signing account
//!
//! Handles:
//! - Local nonce tracking so back-to-back dispatches don't wait on the node
//! - Resynchronization from the chain after any failed attempt
//! - Stale tracking when a resync itself could not reach the node
//!
//! The counter is owned by the dispatch worker and is never shared; the
//! queue guarantees only one dispatch reads it at a time.

use crate::chain::{ChainClient, ChainFailure};

use ethers::types::Address;
use tracing::{debug, warn};

/// Next-nonce counter for one signer
#[derive(Debug)]
pub struct NonceCounter {
    /// Signing account
    address: Address,
    /// Next nonce to hand out
    next: u64,
    /// False after a resync could not reach the chain
    synced: bool,
}

impl NonceCounter {
    /// Initialize from the chain's pending nonce
    pub async fn init(client: &dyn ChainClient) -> Result<Self, ChainFailure> {
        let address = client.signer_address();
        let next = client.pending_nonce(address).await?;

        debug!("Initialized nonce for signer {:?}: {}", address, next);

        Ok(Self {
            address,
            next,
            synced: true,
        })
    }

    /// Read and increment. Every attempted dispatch consumes one value,
    /// whether or not it lands.
    pub fn allocate(&mut self) -> u64 {
        let nonce = self.next;
        self.next += 1;
        debug!("Allocated nonce {} for signer {:?}", nonce, self.address);
        nonce
    }

    /// Replace the local value with the chain's pending nonce.
    ///
    /// The chain is authoritative: the counter adopts its value even when
    /// lower, so nonces abandoned before reaching the mempool are reclaimed.
    /// On failure the counter is marked stale.
    pub async fn resync(&mut self, client: &dyn ChainClient) -> Result<u64, ChainFailure> {
        match client.pending_nonce(self.address).await {
            Ok(on_chain) => {
                if on_chain != self.next {
                    warn!(
                        "Nonce resync for signer {:?}: local {}, chain {}",
                        self.address, self.next, on_chain
                    );
                }
                self.next = on_chain;
                self.synced = true;
                crate::metrics::record_nonce_resync(client.chain_id(), on_chain);
                Ok(on_chain)
            }
            Err(e) => {
                warn!("Nonce resync failed for signer {:?}: {}", self.address, e);
                self.synced = false;
                Err(e)
            }
        }
    }

    /// Resync first if the last resync failed
    pub async fn ensure_synced(&mut self, client: &dyn ChainClient) -> Result<(), ChainFailure> {
        if !self.synced {
            self.resync(client).await?;
        }
        Ok(())
    }

    /// Next nonce that will be allocated
    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use mockall::Sequence;

    fn signer() -> Address {
        Address::from_low_u64_be(0xabc)
    }

    #[tokio::test]
    async fn test_init_and_allocate() {
        let mut client = MockChainClient::new();
        client.expect_signer_address().return_const(signer());
        client
            .expect_pending_nonce()
            .withf(|address| *address == Address::from_low_u64_be(0xabc))
            .times(1)
            .returning(|_| Ok(41));

        let mut counter = NonceCounter::init(&client).await.unwrap();
        assert_eq!(counter.allocate(), 41);
        assert_eq!(counter.allocate(), 42);
        assert_eq!(counter.peek(), 43);
    }

    #[tokio::test]
    async fn test_resync_adopts_chain_value() {
        let mut seq = Sequence::new();
        let mut client = MockChainClient::new();
        client.expect_signer_address().return_const(signer());
        client.expect_chain_id().return_const(1u64);
        client
            .expect_pending_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(5));
        client
            .expect_pending_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(9));
        client
            .expect_pending_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(6));

        let mut counter = NonceCounter::init(&client).await.unwrap();
        counter.allocate();
        assert_eq!(counter.resync(&client).await.unwrap(), 9);
        assert_eq!(counter.allocate(), 9);

        // Abandoned nonces that never reached the mempool are reclaimed
        assert_eq!(counter.resync(&client).await.unwrap(), 6);
        assert_eq!(counter.peek(), 6);
    }

    #[tokio::test]
    async fn test_failed_resync_marks_stale() {
        let mut seq = Sequence::new();
        let mut client = MockChainClient::new();
        client.expect_signer_address().return_const(signer());
        client.expect_chain_id().return_const(1u64);
        client
            .expect_pending_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(3));
        client
            .expect_pending_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ChainFailure::transport("connection refused")));
        client
            .expect_pending_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(4));

        let mut counter = NonceCounter::init(&client).await.unwrap();
        assert!(counter.resync(&client).await.is_err());
        assert!(!counter.is_synced());

        counter.ensure_synced(&client).await.unwrap();
        assert!(counter.is_synced());
        assert_eq!(counter.peek(), 4);

        // Already synced: no further chain call
        counter.ensure_synced(&client).await.unwrap();
    }
}
