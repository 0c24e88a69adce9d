// Library crate - exports the trading loop's modules

pub mod config;
pub mod confluence;
pub mod connector;
pub mod decision;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod market;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod webhook;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{StoreError, TradingError};
pub use types::*;
