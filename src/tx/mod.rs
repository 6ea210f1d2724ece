//! Nonce bookkeeping and gas limit selection for the dispatch worker

mod gas;
mod nonce;

pub use gas::GasEstimator;
pub use nonce::NonceCounter;
