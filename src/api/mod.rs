//! HTTP API for health checks and status

use crate::chain::ChainClient;
use crate::config::ApiConfig;
use crate::coordinator::TransactionCoordinator;
use crate::error::CoordinatorResult;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: TransactionCoordinator,
    pub client: Arc<dyn ChainClient>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> CoordinatorResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - worker alive and the chain answering
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let worker = state.coordinator.is_running();

    let chain = match state
        .client
        .pending_nonce(state.coordinator.signer())
        .await
    {
        Ok(_) => true,
        Err(e) => {
            warn!("Readiness: chain {} unreachable: {}", state.client.chain_id(), e);
            false
        }
    };

    let status = if worker && chain {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready: worker && chain,
            worker,
            chain,
        }),
    )
}

/// Coordinator identity
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        chain_id: state.coordinator.chain_id(),
        signer: format!("{:?}", state.coordinator.signer()),
        running: state.coordinator.is_running(),
    })
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    worker: bool,
    chain: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    chain_id: u64,
    signer: String,
    running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainFailure, MockChainClient};
    use crate::config::CoordinatorConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ethers::types::Address;
    use tower::ServiceExt;

    fn mock_chain(reachable: bool) -> Arc<dyn ChainClient> {
        let mut client = MockChainClient::new();
        client.expect_chain_id().return_const(5u64);
        client
            .expect_signer_address()
            .return_const(Address::from_low_u64_be(0x77));
        client.expect_pending_nonce().returning(move |_| {
            if reachable {
                Ok(3)
            } else {
                Err(ChainFailure::transport("connection refused"))
            }
        });
        Arc::new(client)
    }

    async fn app(reachable: bool) -> (Router, tokio::task::JoinHandle<()>) {
        let (coordinator, worker) =
            TransactionCoordinator::spawn(mock_chain(true), CoordinatorConfig::default())
                .await
                .unwrap();
        let state = AppState {
            coordinator,
            client: mock_chain(reachable),
        };
        (router(state), worker)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _worker) = app(true).await;
        let (status, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_when_chain_answers() {
        let (app, _worker) = app(true).await;
        let (status, body) = get(app, "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }

    #[tokio::test]
    async fn test_not_ready_when_chain_unreachable() {
        let (app, _worker) = app(false).await;
        let (status, body) = get(app, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["worker"], true);
        assert_eq!(body["chain"], false);
    }

    #[tokio::test]
    async fn test_not_ready_when_worker_stopped() {
        let (app, worker) = app(true).await;
        worker.abort();
        let _ = worker.await;

        let (status, body) = get(app, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["worker"], false);
    }

    #[tokio::test]
    async fn test_status() {
        let (app, _worker) = app(true).await;
        let (status, body) = get(app, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chain_id"], 5);
        assert_eq!(body["running"], true);
    }
}
