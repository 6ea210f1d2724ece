//! Gas limit selection for dispatched calls

use crate::chain::{ChainClient, ContractCall};
use crate::classify::{classify, ClassifiedError, ErrorKind};
use crate::config::CoordinatorConfig;

use tracing::{debug, warn};

/// Gas estimator for transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Static limit used when the estimator is unavailable
    fallback_gas_limit: u64,
}

impl GasEstimator {
    pub fn new(gas_limit_buffer_percent: u64, fallback_gas_limit: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
            fallback_gas_limit,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.gas_limit_buffer_percent, config.fallback_gas_limit)
    }

    /// Apply the safety margin, rounding up
    pub fn with_margin(&self, estimate: u64) -> u64 {
        let scaled = estimate as u128 * (100 + self.gas_limit_buffer_percent as u128);
        let limit = (scaled + 99) / 100;
        u64::try_from(limit).unwrap_or(u64::MAX)
    }

    /// Pick the gas limit for `call`.
    ///
    /// A revert during estimation is final and is returned as the error: the
    /// chain has already said this call cannot succeed. Any other estimator
    /// failure falls back to the static limit.
    pub async fn gas_limit(
        &self,
        client: &dyn ChainClient,
        call: &ContractCall,
    ) -> Result<u64, ClassifiedError> {
        match client.estimate_gas(call).await {
            Ok(estimate) => {
                let limit = self.with_margin(estimate);
                debug!("Gas for {}: estimate {}, limit {}", call, estimate, limit);
                Ok(limit)
            }
            Err(failure) => {
                let classified = classify(&failure);
                if classified.kind == ErrorKind::ContractRevert {
                    return Err(classified);
                }

                warn!(
                    "Gas estimation for {} failed ({}), using fallback limit {}",
                    call, classified, self.fallback_gas_limit
                );
                crate::metrics::record_fallback_gas(client.chain_id());
                Ok(self.fallback_gas_limit)
            }
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::from_config(&CoordinatorConfig::default())
    }
}
