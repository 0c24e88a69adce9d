//! Trade execution
//!
//! Turns a validated decision into connector calls and ledger mutations.
//! The stack invariant is checked before any external call; the ledger is
//! only persisted after the venue confirms, so a failed open leaves no
//! phantom entry. Closes are keyed by position id so a retried sequence
//! cannot double-execute on the venue.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::connector::{CloseRequest, OpenRequest, PerpConnector};
use crate::decision::{DecisionAction, TradeDecision};
use crate::error::TradingError;
use crate::ledger::{settle_fifo, validate_stack};
use crate::store::{update_state, StateStore};
use crate::types::{now_unix, Position, PositionSide};

pub struct TradeExecutor {
    connector: Arc<dyn PerpConnector>,
    store: Arc<dyn StateStore>,
    config: AppConfig,
}

impl TradeExecutor {
    pub fn new(connector: Arc<dyn PerpConnector>, store: Arc<dyn StateStore>, config: AppConfig) -> Self {
        Self {
            connector,
            store,
            config,
        }
    }

    /// Execute one decision: size from free balance and dispatch to buy or
    /// sell. Hold is a logged no-op.
    pub async fn execute(&self, decision: &TradeDecision) -> Result<(), TradingError> {
        let (asset, is_buy) = match &decision.action {
            DecisionAction::Hold => {
                info!("decision is hold, nothing to execute");
                return Ok(());
            }
            DecisionAction::Buy(asset) => (asset, true),
            DecisionAction::Sell(asset) => (asset, false),
        };

        let pair = self
            .config
            .pair_for_asset(asset)
            .ok_or_else(|| TradingError::Validation(format!("unknown asset '{asset}'")))?
            .to_string();

        let balance = self
            .connector
            .free_balance()
            .await
            .map_err(|e| TradingError::Execution(format!("balance fetch failed: {e}")))?;
        let amount = balance * self.config.buy_percentage;

        if is_buy {
            self.buy(&pair, amount, decision.leverage).await
        } else {
            self.sell(&pair, amount).await
        }
    }

    /// Open a long sized `quote_amount` x `leverage` and append the entry to
    /// the pair's stack once the venue confirms.
    pub async fn buy(&self, pair: &str, quote_amount: f64, leverage: f64) -> Result<(), TradingError> {
        let (state, _) = self
            .store
            .load()
            .await
            .map_err(|e| TradingError::Execution(format!("state load failed: {e}")))?;
        validate_stack(&state.positions)?;

        let receipt = self
            .connector
            .open_position(&OpenRequest {
                pair: pair.to_string(),
                amount: quote_amount,
                leverage,
                side: "long".to_string(),
            })
            .await
            .map_err(|e| TradingError::Execution(format!("open failed: {e}")))?;

        let position = Position {
            id: Uuid::new_v4(),
            timestamp: now_unix(),
            amount: quote_amount,
            pair: pair.to_string(),
            entry_price: receipt.entry_price,
            side: PositionSide::Long,
            leverage,
        };

        info!(
            "opened {} notional {:.2} at {:.1}x, entry {:.4} (tx {})",
            pair, quote_amount, leverage, receipt.entry_price, receipt.tx_ref
        );

        update_state(self.store.as_ref(), |s| {
            s.positions.push(position.clone());
        })
        .await
        .map_err(|e| TradingError::Execution(format!("ledger persist failed: {e}")))?;

        Ok(())
    }

    /// Close up to `quote_amount` of the pair's stack, oldest entries first.
    /// The remaining stack is persisted only after every close confirmed.
    pub async fn sell(&self, pair: &str, quote_amount: f64) -> Result<(), TradingError> {
        let (state, _) = self
            .store
            .load()
            .await
            .map_err(|e| TradingError::Execution(format!("state load failed: {e}")))?;
        validate_stack(&state.positions)?;

        let pair_stack: Vec<Position> = state
            .positions
            .iter()
            .filter(|p| p.pair == pair)
            .cloned()
            .collect();
        let settlement = settle_fifo(quote_amount, &pair_stack);

        if settlement.to_close.is_empty() {
            info!("nothing to sell for {}", pair);
            return Ok(());
        }

        for entry in &settlement.to_close {
            self.connector
                .close_position(&CloseRequest {
                    position_id: entry.id,
                    pair: pair.to_string(),
                    amount: entry.amount,
                })
                .await
                .map_err(|e| {
                    warn!(
                        "close sequence for {} interrupted at position {}; \
                         venue and ledger may diverge until retried",
                        pair, entry.id
                    );
                    TradingError::Execution(format!("close failed for {}: {e}", entry.id))
                })?;
            info!("closed {:.2} of position {} on {}", entry.amount, entry.id, pair);
        }

        let remaining = settlement.remaining;
        update_state(self.store.as_ref(), |s| {
            s.positions.retain(|p| p.pair != pair);
            s.positions.extend(remaining.clone());
        })
        .await
        .map_err(|e| TradingError::Execution(format!("ledger persist failed: {e}")))?;

        Ok(())
    }
}
