//! Ethers-backed chain client with multi-RPC failover and a local signer

use super::types::{ContractCall, ReceiptStatus, TransactionReceipt, TxHandle};
use super::{ChainClient, ChainFailure, FailureSignal};
use crate::config::{ChainConfig, GasPriceStrategy, WalletConfig};
use crate::error::{CoordinatorError, CoordinatorResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Eip1559TransactionRequest, TransactionRequest, H256, U256,
};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Multi-provider chain client with automatic failover
pub struct EthersChainClient {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Signing key, bound to the configured chain id
    wallet: LocalWallet,
}

impl EthersChainClient {
    /// Create a client, loading the signer from the configured env var
    pub async fn new(config: ChainConfig, wallet_config: &WalletConfig) -> CoordinatorResult<Self> {
        let wallet = load_wallet(wallet_config)?;
        Self::with_wallet(config, wallet).await
    }

    /// Create a client around an already loaded signer, checking that the
    /// RPC serves the configured chain
    pub async fn with_wallet(config: ChainConfig, wallet: LocalWallet) -> CoordinatorResult<Self> {
        let client = Self::from_parts(config, wallet)?;

        // Refuse to sign for the wrong network
        let reported = client
            .request("chain id query", client.http().get_chainid())
            .await
            .map_err(|e| CoordinatorError::ChainConnection {
                chain_id: client.config.chain_id,
                message: e.to_string(),
            })?;
        if reported != U256::from(client.config.chain_id) {
            return Err(CoordinatorError::Config(format!(
                "RPC for {} reports chain id {}, expected {}",
                client.config.name, reported, client.config.chain_id
            )));
        }

        info!(
            "Chain client for {} (ID: {}) ready with signer {:?}",
            client.config.name,
            client.config.chain_id,
            client.wallet.address()
        );

        Ok(client)
    }

    /// Build the providers without touching the network
    fn from_parts(config: ChainConfig, wallet: LocalWallet) -> CoordinatorResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(config.poll_interval_ms));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(CoordinatorError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        let wallet = wallet.with_chain_id(config.chain_id);

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            wallet,
        })
    }

    /// Await one RPC request, bounded by the configured request timeout.
    /// A node that never answers becomes a transport failure.
    async fn request<T, F>(&self, what: &str, request: F) -> Result<T, ChainFailure>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let limit = Duration::from_secs(self.config.request_timeout_secs);
        match timeout(limit, request).await {
            Ok(result) => result.map_err(provider_failure),
            Err(_) => Err(ChainFailure::transport(format!(
                "{} timed out after {}s",
                what, self.config.request_timeout_secs
            ))),
        }
    }

    /// Get the active HTTP provider
    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        if self.http_providers.len() < 2 {
            return;
        }
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Get current gas price based on chain strategy
    async fn get_gas_price(&self) -> Result<GasPrice, ChainFailure> {
        match self.config.gas_price_strategy {
            GasPriceStrategy::Legacy => {
                let price = self
                    .request("gas price query", self.http().get_gas_price())
                    .await?;
                Ok(GasPrice::Legacy(price))
            }
            GasPriceStrategy::Eip1559 => {
                let (max_fee, priority_fee) = self.estimate_eip1559_fees().await?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                })
            }
        }
    }

    /// Estimate EIP-1559 fees
    async fn estimate_eip1559_fees(&self) -> Result<(U256, U256), ChainFailure> {
        let block = self
            .request("latest block query", self.http().get_block(BlockNumber::Latest))
            .await?
            .ok_or_else(|| ChainFailure::transport("No latest block"))?;

        let base_fee = block.base_fee_per_gas.ok_or_else(|| {
            ChainFailure::new(FailureSignal::Unrecognized, "No base fee in latest block")
        })?;

        // 2 gwei tip
        let priority_fee = U256::from(2_000_000_000u64);

        // Max fee = 2 * base_fee + priority_fee (buffer for block variability)
        let max_fee = base_fee * 2 + priority_fee;

        let max_gwei = U256::from(self.config.max_gas_price_gwei) * U256::from(1_000_000_000u64);
        let max_fee = std::cmp::min(max_fee, max_gwei);
        let priority_fee = std::cmp::min(priority_fee, max_fee);

        Ok((max_fee, priority_fee))
    }

    /// Build an unsigned transaction for `call`
    fn build_tx(
        &self,
        call: &ContractCall,
        nonce: u64,
        gas_limit: u64,
        gas_price: &GasPrice,
    ) -> TypedTransaction {
        match gas_price {
            GasPrice::Legacy(price) => {
                let tx = TransactionRequest::new()
                    .from(self.wallet.address())
                    .to(call.to)
                    .data(call.data.clone())
                    .value(call.value)
                    .nonce(nonce)
                    .gas(gas_limit)
                    .gas_price(*price)
                    .chain_id(self.config.chain_id);
                TypedTransaction::Legacy(tx)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let tx = Eip1559TransactionRequest::new()
                    .from(self.wallet.address())
                    .to(call.to)
                    .data(call.data.clone())
                    .value(call.value)
                    .nonce(nonce)
                    .gas(gas_limit)
                    .max_fee_per_gas(*max_fee_per_gas)
                    .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                    .chain_id(self.config.chain_id);
                TypedTransaction::Eip1559(tx)
            }
        }
    }

    /// Poll until the receipt exists and has enough confirmations
    async fn poll_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt, ChainFailure> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            match self
                .request("receipt query", self.http().get_transaction_receipt(tx_hash))
                .await
            {
                Ok(Some(receipt)) => {
                    if let Some(block) = receipt.block_number.map(|b| b.as_u64()) {
                        if self.has_confirmations(block).await {
                            return Ok(convert_receipt(&receipt, block));
                        }
                        debug!("Transaction {:?} included in block {}, waiting for confirmations", tx_hash, block);
                    }
                }
                Ok(None) => {
                    debug!("Transaction {:?} not yet included on chain {}", tx_hash, self.config.chain_id);
                }
                Err(e) => {
                    warn!("Failed to get receipt from chain {}: {}", self.config.chain_id, e);
                    self.failover();
                }
            }

            sleep(poll_interval).await;
        }
    }

    async fn has_confirmations(&self, tx_block: u64) -> bool {
        if self.config.confirmations <= 1 {
            return true;
        }
        match self
            .request("block number query", self.http().get_block_number())
            .await
        {
            Ok(current) => current.as_u64().saturating_sub(tx_block) + 1 >= self.config.confirmations,
            Err(e) => {
                warn!("Failed to get block number from chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn signer_address(&self) -> Address {
        self.wallet.address()
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainFailure> {
        let mut last_failure = ChainFailure::transport("No RPC providers");

        for _ in 0..self.http_providers.len() {
            let query = self
                .http()
                .get_transaction_count(address, Some(BlockNumber::Pending.into()));
            match self.request("pending nonce query", query).await {
                Ok(nonce) => return Ok(saturating_u64(nonce)),
                Err(failure) => {
                    if failure.signal != FailureSignal::Transport {
                        return Err(failure);
                    }
                    warn!("Failed to get pending nonce from chain {}: {}", self.config.chain_id, failure);
                    self.failover();
                    last_failure = failure;
                }
            }
        }

        Err(last_failure)
    }

    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64, ChainFailure> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.wallet.address())
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .into();

        let mut last_failure = ChainFailure::transport("No RPC providers");

        for _ in 0..self.http_providers.len() {
            match self
                .request("gas estimation", self.http().estimate_gas(&tx, None))
                .await
            {
                Ok(gas) => return Ok(saturating_u64(gas)),
                Err(failure) => {
                    // Reverts are deterministic; only transport faults move to the next node
                    if failure.signal != FailureSignal::Transport {
                        return Err(failure);
                    }
                    warn!("Gas estimation transport failure on chain {}: {}", self.config.chain_id, failure);
                    self.failover();
                    last_failure = failure;
                }
            }
        }

        Err(last_failure)
    }

    async fn send(
        &self,
        call: &ContractCall,
        nonce: u64,
        gas_limit: u64,
    ) -> Result<TxHandle, ChainFailure> {
        let gas_price = match self.get_gas_price().await {
            Ok(price) => price,
            Err(failure) => {
                if failure.signal == FailureSignal::Transport {
                    self.failover();
                }
                return Err(failure);
            }
        };
        let tx = self.build_tx(call, nonce, gas_limit, &gas_price);

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(signing_failure)?;
        let signed_tx = tx.rlp_signed(&signature);

        let send_timeout = Duration::from_secs(self.config.send_timeout_secs);
        let result = timeout(send_timeout, self.http().send_raw_transaction(signed_tx)).await;

        match result {
            Ok(Ok(pending_tx)) => {
                let hash = pending_tx.tx_hash();
                debug!("Transaction {:?} broadcast with nonce {} (gas limit {})", hash, nonce, gas_limit);
                Ok(TxHandle { hash, nonce })
            }
            Ok(Err(e)) => {
                let failure = provider_failure(e);
                if failure.signal == FailureSignal::Transport {
                    self.failover();
                }
                Err(failure)
            }
            Err(_) => {
                self.failover();
                Err(ChainFailure::transport(format!(
                    "Transaction send timed out after {}s",
                    self.config.send_timeout_secs
                )))
            }
        }
    }

    async fn await_receipt(&self, handle: TxHandle) -> Result<TransactionReceipt, ChainFailure> {
        let receipt_timeout = Duration::from_secs(self.config.receipt_timeout_secs);

        match timeout(receipt_timeout, self.poll_receipt(handle.hash)).await {
            Ok(result) => result,
            Err(_) => Err(ChainFailure::transport(format!(
                "Timed out after {}s waiting for receipt of {:?} (nonce {})",
                self.config.receipt_timeout_secs, handle.hash, handle.nonce
            ))),
        }
    }
}

/// Gas price types
#[derive(Debug, Clone)]
enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

/// Load the signer from the environment variable named in config
fn load_wallet(config: &WalletConfig) -> CoordinatorResult<LocalWallet> {
    let key = std::env::var(&config.private_key_env).map_err(|_| {
        CoordinatorError::Wallet(format!(
            "No wallet configured. Set {} to the signer's private key",
            config.private_key_env
        ))
    })?;

    key.trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|e| CoordinatorError::Wallet(format!("Invalid private key: {}", e)))
}

/// A local key never declines; a signing error is an encoding or chain id problem
fn signing_failure(err: impl std::fmt::Display) -> ChainFailure {
    ChainFailure::new(
        FailureSignal::Unrecognized,
        format!("failed to sign transaction: {}", err),
    )
}

/// Map a provider error onto a structured failure, keeping any revert payload
fn provider_failure(err: ProviderError) -> ChainFailure {
    if let Some(response) = err.as_error_response() {
        let mut failure = ChainFailure::from_rpc(Some(response.code), response.message.clone());
        if let Some(data) = response.as_revert_data().filter(|d| !d.is_empty()) {
            failure = failure.with_revert_data(data);
        }
        return failure;
    }

    match err {
        ProviderError::HTTPError(e) => ChainFailure::transport(e.to_string()),
        other => ChainFailure::from_rpc(None, other.to_string()),
    }
}

fn convert_receipt(receipt: &ethers::types::TransactionReceipt, block: u64) -> TransactionReceipt {
    let status = if receipt.status.map(|s| s.as_u64()) == Some(1) {
        ReceiptStatus::Success
    } else {
        ReceiptStatus::Failed
    };

    TransactionReceipt {
        hash: receipt.transaction_hash,
        block_number: block,
        gas_used: receipt.gas_used.map(saturating_u64).unwrap_or_default(),
        status,
    }
}

fn saturating_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U64;

    #[test]
    fn test_load_wallet_from_env() {
        std::env::set_var(
            "LEDGER_TEST_SIGNER_KEY",
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        );
        let config = WalletConfig {
            private_key_env: "LEDGER_TEST_SIGNER_KEY".to_string(),
        };
        let wallet = load_wallet(&config).unwrap();
        assert_eq!(
            format!("{:?}", wallet.address()),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_load_wallet_missing_env() {
        let config = WalletConfig {
            private_key_env: "LEDGER_TEST_SIGNER_KEY_UNSET".to_string(),
        };
        assert!(matches!(load_wallet(&config), Err(CoordinatorError::Wallet(_))));
    }

    #[test]
    fn test_convert_receipt_status() {
        let mut receipt = ethers::types::TransactionReceipt {
            transaction_hash: H256::from_low_u64_be(9),
            gas_used: Some(U256::from(52_000)),
            status: Some(U64::from(1)),
            ..Default::default()
        };

        let ok = convert_receipt(&receipt, 100);
        assert_eq!(ok.status, ReceiptStatus::Success);
        assert_eq!(ok.gas_used, 52_000);
        assert_eq!(ok.block_number, 100);

        receipt.status = Some(U64::from(0));
        assert_eq!(convert_receipt(&receipt, 100).status, ReceiptStatus::Failed);
    }

    #[test]
    fn test_saturating_u64() {
        assert_eq!(saturating_u64(U256::from(21_000)), 21_000);
        assert_eq!(saturating_u64(U256::MAX), u64::MAX);
    }

    #[test]
    fn test_signing_failure_is_not_a_user_rejection() {
        let failure = signing_failure("invalid chain id");
        assert_eq!(failure.signal, FailureSignal::Unrecognized);

        let classified = crate::classify::classify(&failure);
        assert_eq!(classified.kind, crate::classify::ErrorKind::Unknown);
        assert!(!classified.retryable);
    }

    fn silent_chain(addr: std::net::SocketAddr) -> ChainConfig {
        let url = format!("http://{}", addr);
        ChainConfig {
            chain_id: 31337,
            name: "silent".to_string(),
            rpc_urls: vec![url.clone(), url],
            gas_price_strategy: GasPriceStrategy::Legacy,
            max_gas_price_gwei: 500,
            confirmations: 1,
            poll_interval_ms: 100,
            receipt_timeout_secs: 120,
            send_timeout_secs: 30,
            request_timeout_secs: 5,
        }
    }

    fn test_wallet() -> LocalWallet {
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_node_times_out() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client =
            EthersChainClient::from_parts(silent_chain(listener.local_addr().unwrap()), test_wallet())
                .unwrap();

        let call = ContractCall::new("HealthRecords", "store", Address::from_low_u64_be(0xc0), vec![0xaa]);
        let failure = client.estimate_gas(&call).await.unwrap_err();
        assert_eq!(failure.signal, FailureSignal::Transport);
        assert!(failure.message.contains("timed out"), "{}", failure.message);

        let failure = client.pending_nonce(client.signer_address()).await.unwrap_err();
        assert_eq!(failure.signal, FailureSignal::Transport);
        assert!(failure.message.contains("timed out"), "{}", failure.message);

        let failure = client.send(&call, 0, 21_000).await.unwrap_err();
        assert_eq!(failure.signal, FailureSignal::Transport);
        assert!(failure.message.contains("gas price query timed out"), "{}", failure.message);

        drop(listener);
    }
}
