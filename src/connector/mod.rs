//! Perp venue connector
//!
//! The open/close/positions/balance contract the executor and market
//! aggregator depend on, with a live HTTP client and a simulated variant so
//! core logic runs deterministically without a venue.

mod live;
mod sim;

pub use live::LivePerpClient;
pub use sim::SimulatedConnector;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Position;

/// Request to open a leveraged position
#[derive(Debug, Clone, Serialize)]
pub struct OpenRequest {
    pub pair: String,
    /// Quote-currency notional before leverage
    pub amount: f64,
    pub leverage: f64,
    pub side: String,
}

/// Venue acknowledgement for an open
#[derive(Debug, Clone, Deserialize)]
pub struct OpenReceipt {
    /// Transaction reference on the venue
    #[serde(rename = "txRef")]
    pub tx_ref: String,
    #[serde(rename = "entryPrice")]
    pub entry_price: f64,
}

/// Request to close (part of) a position.
///
/// `position_id` doubles as the idempotency key: retrying a close for the
/// same entry must not double-execute.
#[derive(Debug, Clone, Serialize)]
pub struct CloseRequest {
    #[serde(rename = "positionId")]
    pub position_id: Uuid,
    pub pair: String,
    pub amount: f64,
}

/// Venue acknowledgement for a close
#[derive(Debug, Clone, Deserialize)]
pub struct CloseReceipt {
    #[serde(rename = "txRef")]
    pub tx_ref: String,
}

#[async_trait]
pub trait PerpConnector: Send + Sync {
    async fn open_position(&self, req: &OpenRequest) -> Result<OpenReceipt>;

    async fn close_position(&self, req: &CloseRequest) -> Result<CloseReceipt>;

    /// Current open positions on the venue (best effort)
    async fn list_positions(&self) -> Result<Vec<Position>>;

    /// Free quote-currency balance available for new entries
    async fn free_balance(&self) -> Result<f64>;
}
