//! Market data aggregation
//!
//! One `fetch()` gathers prices, open positions and a news digest
//! concurrently. Price failure fails the aggregate — sizing needs it — while
//! positions and news degrade to an empty list and a sentinel string.

mod prices;

pub use prices::PriceFeed;

use async_trait::async_trait;
use futures::join;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::connector::PerpConnector;
use crate::decision::ReasoningService;
use crate::error::TradingError;
use crate::types::Position;

/// Fixed prompt for the narrative digest
const NEWS_PROMPT: &str = "Search for recent news impacting SOL and BTC prices \
in the last 24 hours. Summarize key factual events.";

/// Sentinel used when the news fetch degrades
pub const NO_NEWS: &str = "No news available";

#[derive(Debug, Clone)]
pub struct MarketData {
    /// Current prices keyed by ticker
    pub prices: HashMap<String, f64>,
    /// Open positions on the venue; empty on fetch failure
    pub positions: Vec<Position>,
    pub news: String,
}

/// The price leg of the aggregate; the live implementation is `PriceFeed`
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn prices(&self) -> Result<HashMap<String, f64>, TradingError>;
}

/// Capability seam over market data so the scheduler can run against fakes
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Prices, positions and news for a full-analysis cycle
    async fn fetch(&self) -> Result<MarketData, TradingError>;

    /// Prices only, for the light-check path
    async fn fetch_prices(&self) -> Result<HashMap<String, f64>, TradingError>;
}

pub struct MarketDataAggregator {
    price_source: Arc<dyn PriceSource>,
    connector: Arc<dyn PerpConnector>,
    reasoning: Arc<dyn ReasoningService>,
}

impl MarketDataAggregator {
    pub fn new(
        price_source: Arc<dyn PriceSource>,
        connector: Arc<dyn PerpConnector>,
        reasoning: Arc<dyn ReasoningService>,
    ) -> Self {
        Self {
            price_source,
            connector,
            reasoning,
        }
    }
}

#[async_trait]
impl MarketSource for MarketDataAggregator {
    /// Fetch prices, positions and news concurrently.
    async fn fetch(&self) -> Result<MarketData, TradingError> {
        let (prices, positions, news) = join!(
            self.price_source.prices(),
            self.connector.list_positions(),
            self.reasoning.complete(NEWS_PROMPT),
        );

        let prices = prices?;

        let positions = positions.unwrap_or_else(|e| {
            warn!("position fetch failed, continuing with empty list: {}", e);
            Vec::new()
        });

        let news = news.unwrap_or_else(|e| {
            warn!("news fetch failed, continuing without digest: {}", e);
            NO_NEWS.to_string()
        });

        Ok(MarketData {
            prices,
            positions,
            news,
        })
    }

    async fn fetch_prices(&self) -> Result<HashMap<String, f64>, TradingError> {
        self.price_source.prices().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{CloseReceipt, CloseRequest, OpenReceipt, OpenRequest};
    use crate::types::{now_unix, PositionSide};
    use anyhow::{anyhow, Result};
    use uuid::Uuid;

    struct StaticPrices(HashMap<String, f64>);

    #[async_trait]
    impl PriceSource for StaticPrices {
        async fn prices(&self) -> Result<HashMap<String, f64>, TradingError> {
            Ok(self.0.clone())
        }
    }

    struct FailingPrices;

    #[async_trait]
    impl PriceSource for FailingPrices {
        async fn prices(&self) -> Result<HashMap<String, f64>, TradingError> {
            Err(TradingError::TransientFetch(
                "primary failed; fallback failed".to_string(),
            ))
        }
    }

    /// Venue that rejects every call
    struct DownConnector;

    #[async_trait]
    impl PerpConnector for DownConnector {
        async fn open_position(&self, _req: &OpenRequest) -> Result<OpenReceipt> {
            Err(anyhow!("venue down"))
        }
        async fn close_position(&self, _req: &CloseRequest) -> Result<CloseReceipt> {
            Err(anyhow!("venue down"))
        }
        async fn list_positions(&self) -> Result<Vec<Position>> {
            Err(anyhow!("venue down"))
        }
        async fn free_balance(&self) -> Result<f64> {
            Err(anyhow!("venue down"))
        }
    }

    struct OnePositionConnector;

    #[async_trait]
    impl PerpConnector for OnePositionConnector {
        async fn open_position(&self, _req: &OpenRequest) -> Result<OpenReceipt> {
            Err(anyhow!("not used"))
        }
        async fn close_position(&self, _req: &CloseRequest) -> Result<CloseReceipt> {
            Err(anyhow!("not used"))
        }
        async fn list_positions(&self) -> Result<Vec<Position>> {
            Ok(vec![Position {
                id: Uuid::new_v4(),
                timestamp: now_unix(),
                amount: 1_500.0,
                pair: "SOL/USDC".to_string(),
                entry_price: 149.5,
                side: PositionSide::Long,
                leverage: 3.3,
            }])
        }
        async fn free_balance(&self) -> Result<f64> {
            Ok(5_000.0)
        }
    }

    struct CannedNews(&'static str);

    #[async_trait]
    impl ReasoningService for CannedNews {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct DownNews;

    #[async_trait]
    impl ReasoningService for DownNews {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(anyhow!("service unavailable"))
        }
    }

    fn sol_prices() -> HashMap<String, f64> {
        HashMap::from([("SOL".to_string(), 150.0)])
    }

    #[tokio::test]
    async fn healthy_legs_pass_through() {
        let aggregator = MarketDataAggregator::new(
            Arc::new(StaticPrices(sol_prices())),
            Arc::new(OnePositionConnector),
            Arc::new(CannedNews("ETF approved")),
        );

        let market = aggregator.fetch().await.unwrap();
        assert_eq!(market.prices["SOL"], 150.0);
        assert_eq!(market.positions.len(), 1);
        assert_eq!(market.news, "ETF approved");
    }

    #[tokio::test]
    async fn failed_positions_and_news_degrade_without_failing_fetch() {
        let aggregator = MarketDataAggregator::new(
            Arc::new(StaticPrices(sol_prices())),
            Arc::new(DownConnector),
            Arc::new(DownNews),
        );

        let market = aggregator.fetch().await.unwrap();
        assert_eq!(market.prices["SOL"], 150.0);
        assert!(market.positions.is_empty());
        assert_eq!(market.news, NO_NEWS);
    }

    #[tokio::test]
    async fn price_failure_fails_the_aggregate() {
        let aggregator = MarketDataAggregator::new(
            Arc::new(FailingPrices),
            Arc::new(OnePositionConnector),
            Arc::new(CannedNews("irrelevant")),
        );

        let err = aggregator.fetch().await.unwrap_err();
        assert!(matches!(err, TradingError::TransientFetch(_)));
    }

    #[tokio::test]
    async fn light_check_path_uses_the_price_leg_only() {
        let aggregator = MarketDataAggregator::new(
            Arc::new(StaticPrices(sol_prices())),
            Arc::new(DownConnector),
            Arc::new(DownNews),
        );

        let prices = aggregator.fetch_prices().await.unwrap();
        assert_eq!(prices["SOL"], 150.0);
    }
}
