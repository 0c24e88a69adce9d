use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Current Unix timestamp in seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Signal timeframe buckets accepted from the signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "30min")]
    Min30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All configured timeframes, lowest first
    pub const ALL: [Timeframe; 4] = [Timeframe::Min30, Timeframe::H1, Timeframe::H4, Timeframe::D1];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "30min" => Some(Timeframe::Min30),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Min30 => "30min",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction carried by a signal or produced by confluence analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
    Hold,
}

impl TradeSide {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            "hold" => Some(TradeSide::Hold),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
            TradeSide::Hold => write!(f, "hold"),
        }
    }
}

/// A directional signal for one ticker on one timeframe.
///
/// Immutable once stored; pruned by retention windows (24h on the ingestion
/// path, 7 days during light checks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub timeframe: Timeframe,
    #[serde(rename = "signal")]
    pub direction: TradeSide,
    pub ticker: String,
    /// Unix seconds, set at ingestion
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Retention deadline, timestamp + 7 days at ingestion; cleanup and the
    /// prompt's signal window drop entries past it
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
}

/// One price sample across the traded assets, appended each light check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub timestamp: i64,
    pub prices: HashMap<String, f64>,
}

/// Side of an open leveraged entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// An open leveraged entry in the per-pair stack.
///
/// `id` is stable for the life of the entry and keys idempotent close
/// requests. `timestamp` is the open time and the settlement ordering key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub timestamp: i64,
    /// Quote-currency notional
    pub amount: f64,
    pub pair: String,
    #[serde(rename = "entryPrice")]
    pub entry_price: f64,
    pub side: PositionSide,
    pub leverage: f64,
}

/// Advisory analysis lock stored in the shared account document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnalysisLock {
    #[serde(rename = "acquiredAt")]
    pub acquired_at: i64,
}

impl AnalysisLock {
    /// Whether the lock has outlived its TTL and no longer excludes runners
    pub fn is_expired(&self, now: i64, ttl_secs: i64) -> bool {
        now - self.acquired_at >= ttl_secs
    }
}

/// The aggregate account document: signals, positions, price history and
/// scheduling bookkeeping, persisted as a single versioned record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default, rename = "priceHistory")]
    pub price_history: Vec<PriceHistoryEntry>,
    /// Unix seconds of the most recent 30min signal, 0 if never
    #[serde(default, rename = "lastTrigger")]
    pub last_trigger: i64,
    /// Unix seconds of the most recent completed full analysis, 0 if never
    #[serde(default, rename = "lastAnalysis")]
    pub last_analysis: i64,
    #[serde(default, rename = "analysisLock", skip_serializing_if = "Option::is_none")]
    pub analysis_lock: Option<AnalysisLock>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: i64,
}
