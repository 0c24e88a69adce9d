//! Live perp venue client
//!
//! HTTP client for the venue's order and account endpoints. Closes carry the
//! position id so a retried request lands on the same venue-side order.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use super::{CloseReceipt, CloseRequest, OpenReceipt, OpenRequest, PerpConnector};
use crate::types::Position;

pub struct LivePerpClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    positions: Vec<Position>,
}

#[derive(Deserialize)]
struct BalanceResponse {
    #[serde(rename = "freeBalance")]
    free_balance: f64,
}

impl LivePerpClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[async_trait]
impl PerpConnector for LivePerpClient {
    async fn open_position(&self, req: &OpenRequest) -> Result<OpenReceipt> {
        info!(
            "Opening {} {} notional {} at {}x",
            req.side, req.pair, req.amount, req.leverage
        );

        let body = json!({
            "pair": req.pair,
            "side": req.side,
            "amount": req.amount,
            "leverage": req.leverage,
            "type": "market",
        });

        let response = self
            .request(self.client.post(format!("{}/orders", self.base_url)))
            .json(&body)
            .send()
            .await
            .context("Failed to send open-position request")?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("open rejected with status {}: {}", status, text));
        }

        let receipt: OpenReceipt =
            serde_json::from_str(&text).context("Failed to parse open-position response")?;
        info!("Opened {}: tx {} entry {}", req.pair, receipt.tx_ref, receipt.entry_price);
        Ok(receipt)
    }

    async fn close_position(&self, req: &CloseRequest) -> Result<CloseReceipt> {
        info!("Closing position {} on {} amount {}", req.position_id, req.pair, req.amount);

        let body = json!({
            "pair": req.pair,
            "side": "close",
            "amount": req.amount,
            "type": "market",
            // Venue-side idempotency key; a retried close is a no-op
            "clientOrderId": req.position_id,
        });

        let response = self
            .request(self.client.post(format!("{}/orders", self.base_url)))
            .json(&body)
            .send()
            .await
            .context("Failed to send close-position request")?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("close rejected with status {}: {}", status, text));
        }

        let receipt: CloseReceipt =
            serde_json::from_str(&text).context("Failed to parse close-position response")?;
        Ok(receipt)
    }

    async fn list_positions(&self) -> Result<Vec<Position>> {
        let response = self
            .request(self.client.get(format!("{}/positions", self.base_url)))
            .send()
            .await
            .context("Failed to fetch positions")?;

        let parsed: PositionsResponse = response
            .json()
            .await
            .context("Failed to parse positions response")?;
        Ok(parsed.positions)
    }

    async fn free_balance(&self) -> Result<f64> {
        let response = self
            .request(self.client.get(format!("{}/balance", self.base_url)))
            .send()
            .await
            .context("Failed to fetch balance")?;

        let parsed: BalanceResponse = response
            .json()
            .await
            .context("Failed to parse balance response")?;
        Ok(parsed.free_balance)
    }
}
