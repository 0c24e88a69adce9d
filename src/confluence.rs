//! Signal confluence analysis
//!
//! Pure reduction of the stored signals into a trade vote: the latest signal
//! per timeframe is counted, a fixed decision table picks the action, and a
//! higher-timeframe sell vetoes a lower-timeframe buy.

use std::collections::HashMap;

use crate::types::{Signal, Timeframe, TradeSide};

/// Result of confluence analysis over one ticker's signals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfluenceDecision {
    pub action: TradeSide,
    /// Nominally 1-10; the high-timeframe override may push this below 1
    /// and it is deliberately not clamped
    pub confidence: i32,
    /// Number of directional (buy + sell) votes across timeframes
    pub confluence_count: u32,
}

/// Reduce signals to the latest per timeframe and apply the decision table.
///
/// Timestamp ties keep the last signal seen in input order.
pub fn analyze_confluence(signals: &[Signal]) -> ConfluenceDecision {
    let mut latest: HashMap<Timeframe, &Signal> = HashMap::new();
    for sig in signals {
        match latest.get(&sig.timeframe) {
            Some(existing) if existing.timestamp > sig.timestamp => {}
            _ => {
                latest.insert(sig.timeframe, sig);
            }
        }
    }

    // Hold signals occupy a timeframe slot but carry no directional vote
    let mut buy_count = 0u32;
    let mut sell_count = 0u32;
    for tf in Timeframe::ALL {
        if let Some(sig) = latest.get(&tf) {
            match sig.direction {
                TradeSide::Buy => buy_count += 1,
                TradeSide::Sell => sell_count += 1,
                TradeSide::Hold => {}
            }
        }
    }

    // First match wins
    let (mut action, mut confidence) = if buy_count >= 2 && sell_count == 0 {
        (TradeSide::Buy, (buy_count as i32 * 2 + 5).min(10))
    } else if sell_count >= 2 && buy_count == 0 {
        (TradeSide::Sell, (sell_count as i32 * 2 + 5).min(10))
    } else if sell_count > buy_count {
        (TradeSide::Sell, 6)
    } else if buy_count > sell_count {
        (TradeSide::Buy, 6)
    } else {
        (TradeSide::Hold, 5)
    };

    // A daily (or failing that, 4h) sell vetoes a buy vote
    let high_tf = latest.get(&Timeframe::D1).or_else(|| latest.get(&Timeframe::H4));
    if let Some(sig) = high_tf {
        if sig.direction == TradeSide::Sell && action == TradeSide::Buy {
            action = TradeSide::Hold;
            confidence -= 2;
        }
    }

    ConfluenceDecision {
        action,
        confidence,
        confluence_count: buy_count + sell_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(tf: Timeframe, dir: TradeSide, ts: i64) -> Signal {
        Signal {
            timeframe: tf,
            direction: dir,
            ticker: "SOL".to_string(),
            timestamp: ts,
            details: None,
            expires_at: ts + 7 * 24 * 3600,
        }
    }

    #[test]
    fn two_buys_no_sells_is_buy() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Buy, 100),
            sig(Timeframe::H1, TradeSide::Buy, 100),
            sig(Timeframe::H4, TradeSide::Hold, 100),
        ];
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Buy);
        assert_eq!(result.confidence, 9); // min(10, 2*2+5)
        assert_eq!(result.confluence_count, 2);
    }

    #[test]
    fn confidence_caps_at_ten() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Buy, 100),
            sig(Timeframe::H1, TradeSide::Buy, 100),
            sig(Timeframe::H4, TradeSide::Buy, 100),
            sig(Timeframe::D1, TradeSide::Buy, 100),
        ];
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Buy);
        assert_eq!(result.confidence, 10); // 4*2+5 = 13, capped
        assert_eq!(result.confluence_count, 4);
    }

    #[test]
    fn two_sells_no_buys_is_sell() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Sell, 100),
            sig(Timeframe::H1, TradeSide::Sell, 100),
        ];
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Sell);
        assert_eq!(result.confidence, 9);
    }

    #[test]
    fn sell_majority_wins_with_fixed_confidence() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Sell, 100),
            sig(Timeframe::H1, TradeSide::Sell, 100),
            sig(Timeframe::H4, TradeSide::Buy, 100),
        ];
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Sell);
        assert_eq!(result.confidence, 6);
    }

    #[test]
    fn conflicting_signals_hold() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Buy, 100),
            sig(Timeframe::H1, TradeSide::Sell, 100),
        ];
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Hold);
        assert_eq!(result.confidence, 5);
        assert_eq!(result.confluence_count, 2);
    }

    #[test]
    fn high_timeframe_sell_overrides_buy() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Buy, 100),
            sig(Timeframe::H1, TradeSide::Buy, 100),
            sig(Timeframe::H4, TradeSide::Sell, 100),
        ];
        // buy=2, sell=1 -> majority buy at 6, then 4h sell forces hold at 4
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Hold);
        assert_eq!(result.confidence, 4);
    }

    #[test]
    fn daily_sell_preferred_over_4h_for_override() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Buy, 100),
            sig(Timeframe::H1, TradeSide::Buy, 100),
            sig(Timeframe::H4, TradeSide::Buy, 100),
            sig(Timeframe::D1, TradeSide::Sell, 100),
        ];
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Hold);
    }

    #[test]
    fn latest_signal_per_timeframe_wins() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Sell, 100),
            sig(Timeframe::Min30, TradeSide::Buy, 200),
            sig(Timeframe::H1, TradeSide::Buy, 100),
        ];
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Buy);
    }

    #[test]
    fn timestamp_tie_keeps_last_seen() {
        let signals = vec![
            sig(Timeframe::Min30, TradeSide::Buy, 100),
            sig(Timeframe::Min30, TradeSide::Sell, 100),
            sig(Timeframe::H1, TradeSide::Sell, 100),
        ];
        let result = analyze_confluence(&signals);
        assert_eq!(result.action, TradeSide::Sell);
        assert_eq!(result.confidence, 9);
    }

    #[test]
    fn no_signals_is_hold() {
        let result = analyze_confluence(&[]);
        assert_eq!(result.action, TradeSide::Hold);
        assert_eq!(result.confidence, 5);
        assert_eq!(result.confluence_count, 0);
    }
}
