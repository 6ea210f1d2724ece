//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction outcomes and attempts
//! - Retries and failures by error kind
//! - Nonce resynchronization and fallback gas usage
//! - Queue depth and end-to-end latency

use crate::classify::ErrorKind;
use crate::error::CoordinatorResult;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "ledger_coordinator_transactions_submitted_total",
        "Total transactions submitted to the coordinator",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "ledger_coordinator_transactions_confirmed_total",
        "Total transactions confirmed on chain",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "ledger_coordinator_transactions_failed_total",
        "Total transactions rejected, by error kind",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref TX_ATTEMPTS: CounterVec = register_counter_vec!(
        "ledger_coordinator_transaction_attempts_total",
        "Total dispatch attempts, including retries",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_RETRIES: CounterVec = register_counter_vec!(
        "ledger_coordinator_transaction_retries_total",
        "Total retries scheduled, by error kind",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "ledger_coordinator_transaction_latency_seconds",
        "Time from submission to confirmation",
        &["chain_id"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    // Queue metrics
    pub static ref QUEUE_DEPTH: GaugeVec = register_gauge_vec!(
        "ledger_coordinator_queue_depth",
        "Transactions waiting for the dispatch worker",
        &["chain_id"]
    ).unwrap();

    // Nonce and gas metrics
    pub static ref NEXT_NONCE: GaugeVec = register_gauge_vec!(
        "ledger_coordinator_next_nonce",
        "Next nonce the worker will assign",
        &["chain_id"]
    ).unwrap();

    pub static ref NONCE_RESYNCS: CounterVec = register_counter_vec!(
        "ledger_coordinator_nonce_resyncs_total",
        "Total nonce resynchronizations from the chain",
        &["chain_id"]
    ).unwrap();

    pub static ref FALLBACK_GAS: CounterVec = register_counter_vec!(
        "ledger_coordinator_fallback_gas_total",
        "Total dispatches using the static fallback gas limit",
        &["chain_id"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> CoordinatorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Render the default registry in the text exposition format
pub fn render() -> Option<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).ok()?;
    String::from_utf8(buffer).ok()
}

// Helper functions to record metrics

pub fn record_tx_submitted(chain_id: u64) {
    let chain = chain_id.to_string();
    TX_SUBMITTED.with_label_values(&[&chain]).inc();
    QUEUE_DEPTH.with_label_values(&[&chain]).inc();
}

pub fn record_dequeued(chain_id: u64) {
    QUEUE_DEPTH
        .with_label_values(&[&chain_id.to_string()])
        .dec();
}

pub fn record_tx_attempt(chain_id: u64) {
    TX_ATTEMPTS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_confirmed(chain_id: u64, latency_secs: f64) {
    let chain = chain_id.to_string();
    TX_CONFIRMED.with_label_values(&[&chain]).inc();
    TX_LATENCY.with_label_values(&[&chain]).observe(latency_secs);
}

pub fn record_tx_failed(chain_id: u64, kind: ErrorKind) {
    TX_FAILED
        .with_label_values(&[&chain_id.to_string(), kind.as_str()])
        .inc();
}

pub fn record_retry(chain_id: u64, kind: ErrorKind) {
    TX_RETRIES
        .with_label_values(&[&chain_id.to_string(), kind.as_str()])
        .inc();
}

pub fn record_nonce_resync(chain_id: u64, nonce: u64) {
    let chain = chain_id.to_string();
    NONCE_RESYNCS.with_label_values(&[&chain]).inc();
    NEXT_NONCE.with_label_values(&[&chain]).set(nonce as f64);
}

pub fn set_next_nonce(chain_id: u64, nonce: u64) {
    NEXT_NONCE
        .with_label_values(&[&chain_id.to_string()])
        .set(nonce as f64);
}

pub fn record_fallback_gas(chain_id: u64) {
    FALLBACK_GAS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    // Registries are process-wide, so each test uses its own chain id label

    #[test]
    fn test_failure_counted_by_kind() {
        record_tx_failed(900_001, ErrorKind::ContractRevert);
        record_tx_failed(900_001, ErrorKind::ContractRevert);
        record_tx_failed(900_001, ErrorKind::NetworkError);

        let reverts = TX_FAILED
            .with_label_values(&["900001", "contract_revert"])
            .get();
        assert_eq!(reverts, 2.0);
        assert_eq!(
            TX_FAILED.with_label_values(&["900001", "network_error"]).get(),
            1.0
        );
    }

    #[test]
    fn test_queue_depth_tracks_submissions() {
        record_tx_submitted(900_002);
        record_tx_submitted(900_002);
        record_dequeued(900_002);

        assert_eq!(QUEUE_DEPTH.with_label_values(&["900002"]).get(), 1.0);
        assert_eq!(TX_SUBMITTED.with_label_values(&["900002"]).get(), 2.0);
    }

    #[test]
    fn test_resync_sets_next_nonce() {
        set_next_nonce(900_003, 4);
        record_nonce_resync(900_003, 9);

        assert_eq!(NEXT_NONCE.with_label_values(&["900003"]).get(), 9.0);
        assert_eq!(NONCE_RESYNCS.with_label_values(&["900003"]).get(), 1.0);
    }

    #[test]
    fn test_render_includes_registered_metrics() {
        record_fallback_gas(900_004);
        let text = render().unwrap();
        assert!(text.contains("ledger_coordinator_fallback_gas_total"));
    }
}
