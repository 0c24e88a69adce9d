//! Analysis scheduler
//!
//! Admission control for the periodic run: acquire the time-boxed lock via a
//! conditional put, branch into full analysis (per ticker, sequential) or a
//! light maintenance pass, and release the lock on every exit path. Ticker
//! failures are contained and collected into the run summary instead of
//! aborting sibling tickers.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{AppConfig, WEEK_SECS};
use crate::confluence::analyze_confluence;
use crate::connector::PerpConnector;
use crate::decision::{build_prompt, DecisionAction, DecisionEngine, PromptInput};
use crate::error::StoreError;
use crate::executor::TradeExecutor;
use crate::market::MarketSource;
use crate::store::{append_price_entry, cleanup_old_data, update_state, StateStore};
use crate::types::{now_unix, AccountState, AnalysisLock, PriceHistoryEntry, Signal};

/// Which branch an invocation took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Another run holds the lock; returned without side effects
    Skipped,
    FullAnalysis,
    LightCheck,
}

/// Result of one ticker's analysis cycle
#[derive(Debug, Clone)]
pub enum TickerOutcome {
    Completed {
        ticker: String,
        action: String,
        confidence: f64,
    },
    Failed {
        ticker: String,
        reason: String,
    },
}

/// What one scheduler invocation did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: RunMode,
    pub outcomes: Vec<TickerOutcome>,
}

impl RunSummary {
    fn skipped() -> Self {
        Self {
            mode: RunMode::Skipped,
            outcomes: Vec::new(),
        }
    }
}

/// Attempts to win the lock's version race before giving up
const LOCK_ATTEMPTS: u32 = 3;

pub struct AnalysisScheduler {
    store: Arc<dyn StateStore>,
    market: Arc<dyn MarketSource>,
    engine: DecisionEngine,
    executor: TradeExecutor,
    connector: Arc<dyn PerpConnector>,
    config: AppConfig,
}

impl AnalysisScheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        market: Arc<dyn MarketSource>,
        engine: DecisionEngine,
        executor: TradeExecutor,
        connector: Arc<dyn PerpConnector>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            market,
            engine,
            executor,
            connector,
            config,
        }
    }

    /// One scheduler invocation: IDLE -> LOCKED -> branch -> IDLE.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let state = match self.try_acquire_lock().await? {
            Some(state) => state,
            None => {
                info!("analysis lock held by another run, skipping");
                return Ok(RunSummary::skipped());
            }
        };

        let result = self.run_locked(&state).await;

        // Release on every exit path; a failed release self-heals via the TTL
        if let Err(e) = self.release_lock().await {
            error!("failed to release analysis lock: {e}");
        }

        result
    }

    /// Conditional lock acquisition. Returns the state as read under the
    /// winning version, or None when another run holds an unexpired lock.
    async fn try_acquire_lock(&self) -> Result<Option<AccountState>> {
        let now = now_unix();
        for _ in 0..LOCK_ATTEMPTS {
            let (mut state, version) = self.store.load().await?;

            if let Some(lock) = state.analysis_lock {
                if !lock.is_expired(now, self.config.lock_ttl_secs) {
                    return Ok(None);
                }
                warn!(
                    "reclaiming analysis lock abandoned at {} (TTL expired)",
                    lock.acquired_at
                );
            }

            state.analysis_lock = Some(AnalysisLock { acquired_at: now });
            state.updated_at = now;
            match self.store.store(&state, version).await {
                Ok(_) => return Ok(Some(state)),
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(anyhow!("could not acquire analysis lock: version race"))
    }

    async fn release_lock(&self) -> Result<()> {
        update_state(self.store.as_ref(), |state| {
            state.analysis_lock = None;
        })
        .await?;
        Ok(())
    }

    async fn run_locked(&self, state: &AccountState) -> Result<RunSummary> {
        let now = now_unix();
        let recent_trigger =
            state.last_trigger > 0 && now - state.last_trigger < self.config.trigger_window_secs;

        if recent_trigger {
            info!("recent trigger at {}, running full analysis", state.last_trigger);
            self.full_analysis(state).await
        } else {
            info!("no recent trigger, running light check");
            Ok(self.light_check().await)
        }
    }

    /// Full analysis: one sequential pass per ticker. Sequential on purpose,
    /// external services rate-limit aggressively. A ticker failure is
    /// recorded and the loop moves on.
    async fn full_analysis(&self, state: &AccountState) -> Result<RunSummary> {
        let mut groups: BTreeMap<String, Vec<Signal>> = BTreeMap::new();
        for signal in &state.signals {
            groups
                .entry(signal.ticker.clone())
                .or_default()
                .push(signal.clone());
        }

        let mut outcomes = Vec::new();
        for (ticker, signals) in groups {
            match self.process_ticker(&ticker, &signals).await {
                Ok((action, confidence)) => {
                    info!("{}: decided {} (confidence {})", ticker, action, confidence);
                    outcomes.push(TickerOutcome::Completed {
                        ticker,
                        action,
                        confidence,
                    });
                }
                Err(e) => {
                    error!("{}: analysis cycle failed: {e}", ticker);
                    outcomes.push(TickerOutcome::Failed {
                        ticker,
                        reason: e.to_string(),
                    });
                }
            }
        }

        update_state(self.store.as_ref(), |s| {
            s.last_analysis = now_unix();
        })
        .await?;

        Ok(RunSummary {
            mode: RunMode::FullAnalysis,
            outcomes,
        })
    }

    /// One ticker's cycle: market data, confluence, prompt, decision, trade.
    async fn process_ticker(&self, ticker: &str, signals: &[Signal]) -> Result<(String, f64)> {
        let pair = self
            .config
            .pair_for_ticker(ticker)
            .ok_or_else(|| anyhow!("no configured pair for ticker '{ticker}'"))?
            .to_string();

        let confluence = analyze_confluence(signals);
        let market = self.market.fetch().await?;

        let free_balance = match self.connector.free_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("balance fetch failed, prompting with zero balance: {e}");
                0.0
            }
        };

        // The ledger, not the venue snapshot, is the stack of record
        let (current, _) = self.store.load().await?;
        let pair_positions: Vec<_> = current
            .positions
            .iter()
            .filter(|p| p.pair == pair)
            .cloned()
            .collect();

        let prompt = build_prompt(&PromptInput {
            pair: &pair,
            signals,
            positions: &pair_positions,
            prices: &market.prices,
            news: &market.news,
            price_history: &current.price_history,
            free_balance,
            confluence,
            leverage: self.config.leverage,
            history_samples: self.config.prompt_history_samples,
        });

        let decision = self.engine.decide(&prompt).await?;
        info!(
            "{}: {} (confidence {}, leverage {}): {}",
            ticker,
            describe_action(&decision.action),
            decision.confidence,
            decision.leverage,
            decision.reason
        );

        self.executor.execute(&decision).await?;

        Ok((describe_action(&decision.action), decision.confidence))
    }

    /// Maintenance pass: sample prices into the history log and prune the
    /// retention windows. Best effort; failures are logged and swallowed.
    async fn light_check(&self) -> RunSummary {
        match self.market.fetch_prices().await {
            Ok(prices) => {
                let entry = PriceHistoryEntry {
                    timestamp: now_unix(),
                    prices,
                };
                if let Err(e) =
                    append_price_entry(self.store.as_ref(), entry, WEEK_SECS).await
                {
                    warn!("light check could not append price sample: {e}");
                }
            }
            Err(e) => warn!("light check price sample failed: {e}"),
        }

        if let Err(e) = cleanup_old_data(self.store.as_ref(), WEEK_SECS).await {
            warn!("light check retention cleanup failed: {e}");
        }

        RunSummary {
            mode: RunMode::LightCheck,
            outcomes: Vec::new(),
        }
    }
}

fn describe_action(action: &DecisionAction) -> String {
    match action {
        DecisionAction::Hold => "hold".to_string(),
        DecisionAction::Buy(asset) => format!("buy_{asset}"),
        DecisionAction::Sell(asset) => format!("sell_{asset}"),
    }
}
