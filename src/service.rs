//! In-process bootstrap for embedding the coordinator
//!
//! Connects the chain client, starts the dispatch worker and, when enabled,
//! the health API and metrics servers. The service layer keeps the returned
//! [`CoordinatorService`] and submits through [`CoordinatorService::coordinator`].

use crate::api::{self, AppState};
use crate::chain::{ChainClient, EthersChainClient};
use crate::config::Settings;
use crate::coordinator::TransactionCoordinator;
use crate::error::CoordinatorResult;
use crate::metrics::MetricsServer;

use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A running coordinator and its background tasks
pub struct CoordinatorService {
    coordinator: TransactionCoordinator,
    worker: JoinHandle<()>,
    servers: Vec<JoinHandle<()>>,
}

impl CoordinatorService {
    /// Connect to the configured chain and start everything
    pub async fn start(settings: &Settings) -> CoordinatorResult<Self> {
        info!("Starting ledger transaction coordinator v{}", env!("CARGO_PKG_VERSION"));

        let client = EthersChainClient::new(settings.chain.clone(), &settings.wallet).await?;
        info!(
            "Connected to {} (chain {}) as {:?}",
            settings.chain.name,
            client.chain_id(),
            client.signer_address()
        );

        Self::start_with_client(settings, Arc::new(client)).await
    }

    /// Start on top of an already connected client
    pub async fn start_with_client(
        settings: &Settings,
        client: Arc<dyn ChainClient>,
    ) -> CoordinatorResult<Self> {
        let (coordinator, worker) =
            TransactionCoordinator::spawn(client.clone(), settings.coordinator.clone()).await?;

        let mut servers = Vec::new();

        if settings.api.enabled {
            let config = settings.api.clone();
            let state = AppState {
                coordinator: coordinator.clone(),
                client,
            };
            info!("API server: http://{}:{}", config.host, config.port);
            servers.push(tokio::spawn(async move {
                if let Err(e) = api::run_server(config, state).await {
                    error!("API server error: {}", e);
                }
            }));
        }

        if settings.metrics.enabled {
            let server = MetricsServer::new(settings.metrics.port);
            info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
            servers.push(tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!("Metrics server error: {}", e);
                }
            }));
        }

        Ok(Self {
            coordinator,
            worker,
            servers,
        })
    }

    /// Handle for submitting transactions
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Stop the servers, then let the worker finish what is already queued.
    ///
    /// Returns once every other clone of the coordinator handle is dropped.
    pub async fn shutdown(self) {
        for server in &self.servers {
            server.abort();
        }
        join_all(self.servers).await;

        drop(self.coordinator);
        if let Err(e) = self.worker.await {
            error!("Dispatch worker ended abnormally: {}", e);
        }

        info!("Ledger transaction coordinator stopped");
    }
}
