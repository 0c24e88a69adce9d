//! Runtime configuration
//!
//! Loaded once at startup from the environment (after `dotenvy`); every
//! component borrows what it needs from `AppConfig`.

use anyhow::{Context, Result};
use std::env;

/// Seven days, the retention window for signals and price history
pub const WEEK_SECS: i64 = 7 * 24 * 60 * 60;

/// One day, the retention window applied on the ingestion path
pub const DAY_SECS: i64 = 24 * 60 * 60;

/// One asset in the trading universe with its price-source identifiers
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Ticker used in signals, e.g. "SOL"
    pub ticker: String,
    /// Trading pair on the perp venue, e.g. "SOL/USDC"
    pub pair: String,
    /// Asset id on the primary price source
    pub price_id: String,
    /// Slug on the fallback price source
    pub fallback_id: String,
}

/// Confidence-tiered leverage bounds
#[derive(Debug, Clone, Copy)]
pub struct LeverageTiers {
    /// Used when confidence < 4
    pub low: f64,
    /// Used when confidence is 4..=7
    pub med: f64,
    /// Used when confidence > 7
    pub high: f64,
}

impl LeverageTiers {
    /// Map a 1-10 confidence score to its leverage tier
    pub fn for_confidence(&self, confidence: f64) -> f64 {
        if confidence > 7.0 {
            self.high
        } else if confidence >= 4.0 {
            self.med
        } else {
            self.low
        }
    }

    /// Whether a service-provided leverage is inside the configured bounds
    pub fn in_bounds(&self, leverage: f64) -> bool {
        leverage >= self.low && leverage <= self.high
    }
}

impl Default for LeverageTiers {
    fn default() -> Self {
        Self { low: 2.5, med: 3.3, high: 4.0 }
    }
}

/// Which perp connector variant to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorMode {
    /// Deterministic in-process fills, no network
    Simulated,
    /// Real venue over HTTP
    Live,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Trading universe
    pub assets: Vec<AssetConfig>,
    /// Leverage bounds by confidence tier
    pub leverage: LeverageTiers,
    /// Fraction of free balance committed per buy
    pub buy_percentage: f64,

    /// Analysis lock TTL in seconds
    pub lock_ttl_secs: i64,
    /// A 30min trigger within this window selects full analysis
    pub trigger_window_secs: i64,
    /// Price-history samples embedded in the prompt
    pub prompt_history_samples: usize,

    /// Primary price source endpoint
    pub price_api_url: String,
    /// Fallback price source endpoint
    pub fallback_api_url: String,

    /// Reasoning service endpoint, model and key
    pub reasoning_api_url: String,
    pub reasoning_model: String,
    pub reasoning_api_key: String,

    /// Perp venue endpoint and optional key
    pub perp_api_url: String,
    pub perp_api_key: Option<String>,

    pub connector_mode: ConnectorMode,
    /// Webhook listen port
    pub port: u16,
    /// Scheduler cadence in seconds
    pub interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assets: vec![
                AssetConfig {
                    ticker: "SOL".to_string(),
                    pair: "SOL/USDC".to_string(),
                    price_id: "So11111111111111111111111111111112".to_string(),
                    fallback_id: "solana".to_string(),
                },
                AssetConfig {
                    ticker: "BTC".to_string(),
                    pair: "BTC/USDC".to_string(),
                    price_id: "EzZp7LRN2B6hQ8t3MmQG6wZMrn6X1rKT7b2Pd2WEL4y".to_string(),
                    fallback_id: "bitcoin".to_string(),
                },
            ],
            leverage: LeverageTiers::default(),
            buy_percentage: 0.3,
            lock_ttl_secs: 300,
            trigger_window_secs: 3600,
            prompt_history_samples: 10,
            price_api_url: "https://lite-api.jup.ag/price/v3".to_string(),
            fallback_api_url: "https://api.coingecko.com/api/v3".to_string(),
            reasoning_api_url: "https://api.x.ai/v1/chat/completions".to_string(),
            reasoning_model: "grok-1".to_string(),
            reasoning_api_key: String::new(),
            perp_api_url: "https://perp.jup.ag/api/v1".to_string(),
            perp_api_key: None,
            connector_mode: ConnectorMode::Simulated,
            port: 8787,
            interval_secs: 1800,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// The reasoning-service key is required; everything else falls back to
    /// defaults.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        cfg.reasoning_api_key = env::var("REASONING_API_KEY")
            .context("REASONING_API_KEY environment variable not set")?;

        if let Ok(url) = env::var("REASONING_API_URL") {
            cfg.reasoning_api_url = url;
        }
        if let Ok(model) = env::var("REASONING_MODEL") {
            cfg.reasoning_model = model;
        }
        if let Ok(url) = env::var("PRICE_API_URL") {
            cfg.price_api_url = url;
        }
        if let Ok(url) = env::var("FALLBACK_PRICE_API_URL") {
            cfg.fallback_api_url = url;
        }
        if let Ok(url) = env::var("PERP_API_URL") {
            cfg.perp_api_url = url;
        }
        cfg.perp_api_key = env::var("PERP_API_KEY").ok();

        if let Ok(pct) = env::var("BUY_PERCENTAGE") {
            cfg.buy_percentage = pct
                .parse::<f64>()
                .context("BUY_PERCENTAGE must be a number")?;
        }
        if let Ok(port) = env::var("PORT") {
            cfg.port = port.parse::<u16>().context("PORT must be a valid port")?;
        }
        if let Ok(secs) = env::var("INTERVAL_SECS") {
            cfg.interval_secs = secs
                .parse::<u64>()
                .context("INTERVAL_SECS must be an integer")?;
        }

        let live = env::var("CONNECTOR_LIVE")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);
        cfg.connector_mode = if live {
            ConnectorMode::Live
        } else {
            ConnectorMode::Simulated
        };

        Ok(cfg)
    }

    /// Look up the pair traded for a ticker, e.g. "SOL" -> "SOL/USDC"
    pub fn pair_for_ticker(&self, ticker: &str) -> Option<&str> {
        self.assets
            .iter()
            .find(|a| a.ticker.eq_ignore_ascii_case(ticker))
            .map(|a| a.pair.as_str())
    }

    /// Look up the pair for a lowercase asset suffix from a decision action,
    /// e.g. "sol" from "buy_sol"
    pub fn pair_for_asset(&self, asset: &str) -> Option<&str> {
        self.pair_for_ticker(asset)
    }
}
