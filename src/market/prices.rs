//! Price feed with primary source and fallback
//!
//! The primary source is retried with linear backoff; only after it is
//! exhausted does the feed try the secondary source once. Non-positive or
//! missing prices count as failures, never as data.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info};

use super::PriceSource;
use crate::config::AssetConfig;
use crate::error::TradingError;
use crate::retry::RetryPolicy;

pub struct PriceFeed {
    client: Client,
    primary_url: String,
    fallback_url: String,
    assets: Vec<AssetConfig>,
    retry: RetryPolicy,
}

/// Primary source reply: `{"data": {"<asset-id>": {"price": "123.45"}}}`
#[derive(Deserialize)]
struct PrimaryResponse {
    data: HashMap<String, PrimaryQuote>,
}

#[derive(Deserialize)]
struct PrimaryQuote {
    price: String,
}

/// Extract per-ticker prices from a primary-source reply. Every configured
/// asset must be present with a positive, parseable price.
fn parse_primary(text: &str, assets: &[AssetConfig]) -> Result<HashMap<String, f64>> {
    let parsed: PrimaryResponse =
        serde_json::from_str(text).context("primary price response was not valid JSON")?;

    let mut prices = HashMap::new();
    for asset in assets {
        let quote = parsed
            .data
            .get(&asset.price_id)
            .ok_or_else(|| anyhow!("primary source missing {}", asset.ticker))?;
        let price: f64 = quote
            .price
            .parse()
            .with_context(|| format!("unparseable price for {}", asset.ticker))?;
        if price <= 0.0 {
            return Err(anyhow!("non-positive price {} for {}", price, asset.ticker));
        }
        prices.insert(asset.ticker.clone(), price);
    }
    Ok(prices)
}

/// Extract per-ticker prices from the fallback source's nested
/// `{"<slug>": {"usd": 123.45}}` shape.
fn parse_fallback(text: &str, assets: &[AssetConfig]) -> Result<HashMap<String, f64>> {
    let parsed: HashMap<String, HashMap<String, f64>> =
        serde_json::from_str(text).context("fallback price response was not valid JSON")?;

    let mut prices = HashMap::new();
    for asset in assets {
        let price = parsed
            .get(&asset.fallback_id)
            .and_then(|m| m.get("usd"))
            .copied()
            .ok_or_else(|| anyhow!("fallback source missing {}", asset.ticker))?;
        if price <= 0.0 {
            return Err(anyhow!("non-positive price {} for {}", price, asset.ticker));
        }
        prices.insert(asset.ticker.clone(), price);
    }
    Ok(prices)
}

impl PriceFeed {
    pub fn new(primary_url: &str, fallback_url: &str, assets: Vec<AssetConfig>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("Failed to create HTTP client"),
            primary_url: primary_url.trim_end_matches('/').to_string(),
            fallback_url: fallback_url.trim_end_matches('/').to_string(),
            assets,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch current prices keyed by ticker.
    ///
    /// Primary with retries, then one fallback pass; if both fail the error
    /// propagates — sizing cannot proceed without prices.
    pub async fn fetch(&self) -> Result<HashMap<String, f64>, TradingError> {
        let primary = self
            .retry
            .run("primary price fetch", |attempt| {
                info!("Fetching prices from primary source (attempt {})", attempt);
                self.fetch_primary()
            })
            .await;

        match primary {
            Ok(prices) => Ok(prices),
            Err(primary_err) => {
                error!(
                    "Primary price source exhausted ({}), trying fallback",
                    primary_err
                );
                self.fetch_fallback().await.map_err(|fallback_err| {
                    TradingError::TransientFetch(format!(
                        "primary failed ({primary_err}); fallback failed ({fallback_err})"
                    ))
                })
            }
        }
    }

    async fn fetch_primary(&self) -> Result<HashMap<String, f64>> {
        let ids = self
            .assets
            .iter()
            .map(|a| a.price_id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let text = self
            .client
            .get(&self.primary_url)
            .query(&[("ids", ids.as_str())])
            .send()
            .await
            .context("primary price request failed")?
            .text()
            .await
            .context("primary price response unreadable")?;

        parse_primary(&text, &self.assets)
    }

    async fn fetch_fallback(&self) -> Result<HashMap<String, f64>> {
        let ids = self
            .assets
            .iter()
            .map(|a| a.fallback_id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let text = self
            .client
            .get(format!("{}/simple/price", self.fallback_url))
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
            .send()
            .await
            .context("fallback price request failed")?
            .text()
            .await
            .context("fallback price response unreadable")?;

        parse_fallback(&text, &self.assets)
    }
}

#[async_trait]
impl PriceSource for PriceFeed {
    async fn prices(&self) -> Result<HashMap<String, f64>, TradingError> {
        self.fetch().await
    }
}
