//! Prompt assembly
//!
//! Deterministic string template: same inputs, same prompt. Map-shaped
//! inputs are sorted before rendering so the reasoning service sees a stable
//! layout across runs.

use chrono::DateTime;
use std::collections::BTreeMap;

use crate::config::LeverageTiers;
use crate::confluence::ConfluenceDecision;
use crate::types::{now_unix, PriceHistoryEntry, Position, Signal};

/// Everything the prompt embeds for one ticker's analysis
pub struct PromptInput<'a> {
    /// Pair under analysis, e.g. "SOL/USDC"
    pub pair: &'a str,
    pub signals: &'a [Signal],
    /// Open positions for the pair under analysis
    pub positions: &'a [Position],
    /// Current prices keyed by ticker
    pub prices: &'a std::collections::HashMap<String, f64>,
    pub news: &'a str,
    pub price_history: &'a [PriceHistoryEntry],
    pub free_balance: f64,
    pub confluence: ConfluenceDecision,
    pub leverage: LeverageTiers,
    /// Number of trailing history samples to embed
    pub history_samples: usize,
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

/// Render the analysis prompt.
///
/// Embeds the last 7 days of signals, the pair's open positions, balance and
/// prices, the trailing price history and the news digest, then instructs
/// the service to answer in strict JSON within the configured leverage
/// bounds.
pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let now = now_unix();

    let signals_text = input
        .signals
        .iter()
        .filter(|s| s.expires_at > now)
        .map(|s| {
            format!(
                "{} {}: {} at {}",
                s.ticker,
                s.timeframe,
                s.direction,
                format_ts(s.timestamp)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let positions_text = input
        .positions
        .iter()
        .map(|p| {
            format!(
                "{{opened: {}, amount: {:.2}, pair: {}, entryPrice: {:.4}, leverage: {:.1}}}",
                format_ts(p.timestamp),
                p.amount,
                p.pair,
                p.entry_price,
                p.leverage
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let prices_sorted: BTreeMap<&String, &f64> = input.prices.iter().collect();
    let prices_text = prices_sorted
        .iter()
        .map(|(ticker, price)| format!("{}: {:.4}", ticker, price))
        .collect::<Vec<_>>()
        .join(", ");

    let history_tail = input
        .price_history
        .iter()
        .rev()
        .take(input.history_samples)
        .collect::<Vec<_>>();
    let history_text = history_tail
        .iter()
        .rev()
        .map(|entry| {
            let row: BTreeMap<&String, &f64> = entry.prices.iter().collect();
            let prices = row
                .iter()
                .map(|(t, p)| format!("{}: {:.4}", t, p))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{} | {}]", format_ts(entry.timestamp), prices)
        })
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "Analyze these trading signals for {pair}: [{signals}].\n\
         Local confluence vote: {vote} (confidence {vote_conf}, {vote_count} agreeing timeframes).\n\
         Current open positions: [{positions}].\n\
         Free balance: {balance:.2} USDC.\n\
         Current prices: {prices}.\n\
         Recent price history (oldest first): {history}.\n\
         Recent news: {news}\n\
         Weight factual events (listings, outages, regulation, on-chain activity) over sentiment.\n\
         Decide for {pair} only, long-only, sells close oldest entries first.\n\
         Output strict JSON with exactly these fields:\n\
         {{\"action\": \"buy_{asset}\"|\"sell_{asset}\"|\"hold\", \"confidence\": 1-10, \
         \"leverage\": {lev_low}-{lev_high}, \"reason\": \"...\"}}",
        pair = input.pair,
        signals = signals_text,
        vote = input.confluence.action,
        vote_conf = input.confluence.confidence,
        vote_count = input.confluence.confluence_count,
        positions = positions_text,
        balance = input.free_balance,
        prices = prices_text,
        history = history_text,
        news = input.news,
        asset = input
            .pair
            .split('/')
            .next()
            .unwrap_or(input.pair)
            .to_lowercase(),
        lev_low = input.leverage.low,
        lev_high = input.leverage.high,
    )
}
