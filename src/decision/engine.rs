//! Decision engine: reasoning-service call with retry and validation

use serde::Deserialize;
use std::sync::Arc;

use super::ReasoningService;
use crate::config::LeverageTiers;
use crate::error::TradingError;
use crate::retry::RetryPolicy;

/// Action the reasoning service selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionAction {
    Hold,
    /// Open a long on the named asset, lowercase, e.g. "sol"
    Buy(String),
    /// Close entries on the named asset
    Sell(String),
}

impl DecisionAction {
    /// Parse the wire form: "hold", "buy_<asset>" or "sell_<asset>"
    pub fn parse(s: &str) -> Option<Self> {
        if s == "hold" {
            return Some(DecisionAction::Hold);
        }
        if let Some(asset) = s.strip_prefix("buy_") {
            if !asset.is_empty() {
                return Some(DecisionAction::Buy(asset.to_string()));
            }
        }
        if let Some(asset) = s.strip_prefix("sell_") {
            if !asset.is_empty() {
                return Some(DecisionAction::Sell(asset.to_string()));
            }
        }
        None
    }
}

/// Validated decision record
#[derive(Debug, Clone)]
pub struct TradeDecision {
    pub action: DecisionAction,
    /// 1-10 as validated from the response
    pub confidence: f64,
    /// Within the configured tier bounds after normalization
    pub leverage: f64,
    pub reason: String,
}

/// Exact response contract; unknown or missing fields fail validation
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDecision {
    action: String,
    confidence: f64,
    leverage: f64,
    reason: String,
}

/// Parse and validate a raw reasoning response.
///
/// Syntax errors, unexpected fields, unknown actions and out-of-range
/// confidence are all rejected; an out-of-bounds leverage is replaced by the
/// confidence-tier value rather than rejected.
fn parse_decision(text: &str, tiers: &LeverageTiers) -> Result<TradeDecision, String> {
    let raw: RawDecision =
        serde_json::from_str(text).map_err(|e| format!("malformed decision JSON: {e}"))?;

    let action = DecisionAction::parse(&raw.action)
        .ok_or_else(|| format!("unknown action '{}'", raw.action))?;

    if !(1.0..=10.0).contains(&raw.confidence) {
        return Err(format!("confidence {} outside 1-10", raw.confidence));
    }

    let leverage = if tiers.in_bounds(raw.leverage) {
        raw.leverage
    } else {
        tiers.for_confidence(raw.confidence)
    };

    Ok(TradeDecision {
        action,
        confidence: raw.confidence,
        leverage,
        reason: raw.reason,
    })
}

pub struct DecisionEngine {
    reasoning: Arc<dyn ReasoningService>,
    retry: RetryPolicy,
    tiers: LeverageTiers,
}

impl DecisionEngine {
    pub fn new(reasoning: Arc<dyn ReasoningService>, tiers: LeverageTiers) -> Self {
        Self {
            reasoning,
            retry: RetryPolicy::default(),
            tiers,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send the prompt and return a validated decision.
    ///
    /// Transport failures and invalid responses are both retried; if the
    /// final attempt still yields an invalid response, that is a
    /// `DecisionServiceError` for the caller's ticker cycle.
    pub async fn decide(&self, prompt: &str) -> Result<TradeDecision, TradingError> {
        let tiers = self.tiers;
        self.retry
            .run("reasoning call", |_attempt| {
                let reasoning = Arc::clone(&self.reasoning);
                async move {
                    let text = reasoning
                        .complete(prompt)
                        .await
                        .map_err(|e| e.to_string())?;
                    parse_decision(&text, &tiers)
                }
            })
            .await
            .map_err(TradingError::DecisionService)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Canned reasoning service: replays a queue of responses
    struct FakeReasoning {
        responses: Vec<Result<String>>,
        calls: AtomicU32,
    }

    impl FakeReasoning {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ReasoningService for FakeReasoning {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.responses.get(idx.min(self.responses.len() - 1)) {
                Some(Ok(s)) => Ok(s.clone()),
                Some(Err(e)) => Err(anyhow!(e.to_string())),
                None => Err(anyhow!("no response scripted")),
            }
        }
    }

    fn engine(responses: Vec<Result<String>>) -> (DecisionEngine, Arc<FakeReasoning>) {
        let fake = Arc::new(FakeReasoning::new(responses));
        let engine = DecisionEngine::new(fake.clone(), LeverageTiers::default())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));
        (engine, fake)
    }

    const VALID: &str =
        r#"{"action": "buy_sol", "confidence": 8, "leverage": 3.3, "reason": "confluence"}"#;

    #[tokio::test]
    async fn valid_response_is_accepted() {
        let (engine, _) = engine(vec![Ok(VALID.to_string())]);
        let decision = engine.decide("prompt").await.unwrap();
        assert_eq!(decision.action, DecisionAction::Buy("sol".to_string()));
        assert_eq!(decision.confidence, 8.0);
        assert_eq!(decision.leverage, 3.3);
    }

    #[tokio::test]
    async fn malformed_response_is_retried_then_accepted() {
        let (engine, fake) = engine(vec![
            Ok("not json at all".to_string()),
            Ok(VALID.to_string()),
        ]);
        let decision = engine.decide("prompt").await.unwrap();
        assert_eq!(decision.action, DecisionAction::Buy("sol".to_string()));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_on_every_attempt_is_a_decision_error() {
        let (engine, fake) = engine(vec![Ok("garbage".to_string())]);
        let err = engine.decide("prompt").await.unwrap_err();
        assert!(matches!(err, TradingError::DecisionService(_)));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transport_failures_exhaust_into_decision_error() {
        let (engine, _) = engine(vec![Err(anyhow!("timeout"))]);
        let err = engine.decide("prompt").await.unwrap_err();
        assert!(matches!(err, TradingError::DecisionService(_)));
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let (engine, _) = engine(vec![Ok(
            r#"{"action": "short_sol", "confidence": 5, "leverage": 3, "reason": "x"}"#.to_string(),
        )]);
        assert!(engine.decide("prompt").await.is_err());
    }

    #[tokio::test]
    async fn extra_fields_fail_validation() {
        let (engine, _) = engine(vec![Ok(
            r#"{"action": "hold", "confidence": 5, "leverage": 3, "reason": "x", "extra": 1}"#
                .to_string(),
        )]);
        assert!(engine.decide("prompt").await.is_err());
    }

    #[tokio::test]
    async fn out_of_bounds_leverage_falls_back_to_tier() {
        let (engine, _) = engine(vec![Ok(
            r#"{"action": "buy_btc", "confidence": 9, "leverage": 20, "reason": "moon"}"#
                .to_string(),
        )]);
        let decision = engine.decide("prompt").await.unwrap();
        // confidence 9 > 7 -> HIGH tier
        assert_eq!(decision.leverage, 4.0);
    }

    #[tokio::test]
    async fn confidence_out_of_range_is_rejected() {
        let (engine, _) = engine(vec![Ok(
            r#"{"action": "hold", "confidence": 11, "leverage": 3, "reason": "x"}"#.to_string(),
        )]);
        assert!(engine.decide("prompt").await.is_err());
    }

    #[test]
    fn action_parsing() {
        assert_eq!(DecisionAction::parse("hold"), Some(DecisionAction::Hold));
        assert_eq!(
            DecisionAction::parse("buy_sol"),
            Some(DecisionAction::Buy("sol".to_string()))
        );
        assert_eq!(
            DecisionAction::parse("sell_btc"),
            Some(DecisionAction::Sell("btc".to_string()))
        );
        assert_eq!(DecisionAction::parse("buy_"), None);
        assert_eq!(DecisionAction::parse("HOLD"), None);
    }
}
