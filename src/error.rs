//! Error taxonomy for the trading loop
//!
//! Orchestration code uses `anyhow` at its boundaries; these typed errors
//! carry the failure class that decides containment (retry, degrade, skip
//! ticker, or abort the trade).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradingError {
    /// Malformed signal or request payload; rejected with no mutation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Price/news/position fetch failure after retries
    #[error("market data fetch failed: {0}")]
    TransientFetch(String),

    /// Reasoning service retry exhaustion or an invalid response
    #[error("reasoning service failed: {0}")]
    DecisionService(String),

    /// Position stack failed validation; aborts before any external call
    #[error("position stack invalid: {0}")]
    LedgerInvariant(String),

    /// External open/close call failed
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Errors from the versioned state store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Conditional put lost the version race to a concurrent writer
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("store backend error: {0}")]
    Backend(String),
}
