//! Simulated perp connector
//!
//! Deterministic in-process fills for tests and dry runs. Entry prices take a
//! small random walk around the configured base price; closes are idempotent
//! per position id, mirroring the live venue contract.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{CloseReceipt, CloseRequest, OpenReceipt, OpenRequest, PerpConnector};
use crate::types::Position;

#[derive(Default)]
struct SimState {
    /// Ids already closed; a repeat close is acknowledged without executing
    closed: HashSet<Uuid>,
    opens_executed: u32,
    closes_executed: u32,
}

pub struct SimulatedConnector {
    base_prices: HashMap<String, f64>,
    balance: f64,
    state: Mutex<SimState>,
    fail_opens: AtomicBool,
    /// Number of closes to allow before failing; u32::MAX = never fail
    closes_before_failure: AtomicU32,
}

impl SimulatedConnector {
    pub fn new(base_prices: HashMap<String, f64>, balance: f64) -> Self {
        Self {
            base_prices,
            balance,
            state: Mutex::new(SimState::default()),
            fail_opens: AtomicBool::new(false),
            closes_before_failure: AtomicU32::new(u32::MAX),
        }
    }

    /// Make every subsequent open fail (test hook)
    pub fn fail_opens(&self) {
        self.fail_opens.store(true, Ordering::SeqCst);
    }

    /// Allow `n` closes, then fail the rest (test hook)
    pub fn fail_closes_after(&self, n: u32) {
        self.closes_before_failure.store(n, Ordering::SeqCst);
    }

    pub fn opens_executed(&self) -> u32 {
        self.state.lock().expect("sim mutex poisoned").opens_executed
    }

    pub fn closes_executed(&self) -> u32 {
        self.state.lock().expect("sim mutex poisoned").closes_executed
    }

    pub fn was_closed(&self, id: Uuid) -> bool {
        self.state.lock().expect("sim mutex poisoned").closed.contains(&id)
    }

    fn fill_price(&self, pair: &str) -> f64 {
        let base = self
            .base_prices
            .get(pair)
            .copied()
            .unwrap_or(100.0);
        // +/- 0.1% slippage around the base
        let jitter = rand::thread_rng().gen_range(-0.001..0.001);
        base * (1.0 + jitter)
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        let mut prices = HashMap::new();
        prices.insert("SOL/USDC".to_string(), 150.0);
        prices.insert("BTC/USDC".to_string(), 60_000.0);
        Self::new(prices, 5_000.0)
    }
}

#[async_trait]
impl PerpConnector for SimulatedConnector {
    async fn open_position(&self, req: &OpenRequest) -> Result<OpenReceipt> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated open failure"));
        }
        let entry_price = self.fill_price(&req.pair);
        let mut state = self.state.lock().expect("sim mutex poisoned");
        state.opens_executed += 1;
        info!(
            "[sim] opened {} notional {} at {}x, entry {:.2}",
            req.pair, req.amount, req.leverage, entry_price
        );
        Ok(OpenReceipt {
            tx_ref: format!("sim-open-{}", state.opens_executed),
            entry_price,
        })
    }

    async fn close_position(&self, req: &CloseRequest) -> Result<CloseReceipt> {
        let mut state = self.state.lock().expect("sim mutex poisoned");
        if state.closed.contains(&req.position_id) {
            // Idempotent repeat: acknowledge without executing again
            info!("[sim] duplicate close for {} ignored", req.position_id);
            return Ok(CloseReceipt {
                tx_ref: format!("sim-close-{}", req.position_id),
            });
        }
        if state.closes_executed >= self.closes_before_failure.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated close failure"));
        }
        state.closed.insert(req.position_id);
        state.closes_executed += 1;
        info!("[sim] closed {} amount {} on {}", req.position_id, req.amount, req.pair);
        Ok(CloseReceipt {
            tx_ref: format!("sim-close-{}", req.position_id),
        })
    }

    async fn list_positions(&self) -> Result<Vec<Position>> {
        Ok(Vec::new())
    }

    async fn free_balance(&self) -> Result<f64> {
        Ok(self.balance)
    }
}
