//! Signal ingestion endpoint
//!
//! POST /webhook accepts a directional signal, validates it, stores it with
//! its retention deadline and nudges the scheduler when the signal is on the
//! trigger timeframe. Rejections return 400 with the reason; storage faults
//! return 500.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::WEEK_SECS;
use crate::store::{append_signal, StateStore};
use crate::types::{now_unix, Signal, Timeframe, TradeSide};

/// Ticker assumed when the sender omits one
const DEFAULT_TICKER: &str = "SOL";

pub struct WebhookState {
    pub store: Arc<dyn StateStore>,
    /// Nudges the scheduler loop when a trigger-timeframe signal lands
    pub trigger_tx: mpsc::Sender<()>,
}

/// Inbound payload; all fields land as options so validation can name what
/// is missing instead of failing deserialization wholesale
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub timeframe: Option<String>,
    pub signal: Option<String>,
    pub ticker: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Validate a payload into a stored signal, stamping ingestion time and the
/// 7-day retention deadline.
fn parse_payload(payload: &WebhookPayload) -> Result<Signal, String> {
    let tf_raw = payload
        .timeframe
        .as_deref()
        .ok_or_else(|| "missing field 'timeframe'".to_string())?;
    let timeframe = Timeframe::parse(tf_raw)
        .ok_or_else(|| format!("invalid timeframe '{tf_raw}', expected 30min|1h|4h|1d"))?;

    let dir_raw = payload
        .signal
        .as_deref()
        .ok_or_else(|| "missing field 'signal'".to_string())?;
    let direction = TradeSide::parse(dir_raw)
        .ok_or_else(|| format!("invalid signal '{dir_raw}', expected buy|sell|hold"))?;

    let ticker = payload
        .ticker
        .as_deref()
        .unwrap_or(DEFAULT_TICKER)
        .to_uppercase();
    if ticker.is_empty() {
        return Err("ticker must not be empty".to_string());
    }

    let now = now_unix();
    Ok(Signal {
        timeframe,
        direction,
        ticker,
        timestamp: now,
        details: payload.details.clone(),
        expires_at: now + WEEK_SECS,
    })
}

/// POST /webhook - ingest one signal
pub async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    let signal = match parse_payload(&payload) {
        Ok(signal) => signal,
        Err(reason) => {
            debug!("rejected webhook payload: {}", reason);
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": reason})),
            );
        }
    };

    info!(
        "signal received: {} {} on {}",
        signal.ticker, signal.direction, signal.timeframe
    );
    let is_trigger = signal.timeframe == Timeframe::Min30;

    if let Err(e) = append_signal(state.store.as_ref(), signal).await {
        error!("failed to store signal: {e}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "failed to store signal"})),
        );
    }

    if is_trigger {
        // Best effort: a full channel means a run is already pending
        if state.trigger_tx.try_send(()).is_err() {
            debug!("scheduler nudge dropped, run already pending");
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"message": "Signal received"})),
    )
}

/// GET /health - liveness probe
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use crate::types::AccountState;

    fn webhook_state() -> (Arc<WebhookState>, Arc<MemoryStateStore>, mpsc::Receiver<()>) {
        let store = Arc::new(MemoryStateStore::new(AccountState::default()));
        let (tx, rx) = mpsc::channel(1);
        let state = Arc::new(WebhookState {
            store: store.clone(),
            trigger_tx: tx,
        });
        (state, store, rx)
    }

    fn payload(json: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn valid_signal_is_stored_and_acknowledged() {
        let (state, store, _rx) = webhook_state();
        let response = handle_webhook(
            State(state),
            Json(payload(serde_json::json!({
                "timeframe": "1h",
                "signal": "buy",
                "ticker": "sol"
            }))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let (stored, _) = store.load().await.unwrap();
        assert_eq!(stored.signals.len(), 1);
        let signal = &stored.signals[0];
        assert_eq!(signal.ticker, "SOL");
        assert_eq!(signal.timeframe, Timeframe::H1);
        assert_eq!(signal.expires_at, signal.timestamp + WEEK_SECS);
        // 1h is not the trigger timeframe
        assert_eq!(stored.last_trigger, 0);
    }

    #[tokio::test]
    async fn trigger_timeframe_nudges_the_scheduler() {
        let (state, store, mut rx) = webhook_state();
        let response = handle_webhook(
            State(state),
            Json(payload(serde_json::json!({
                "timeframe": "30min",
                "signal": "sell"
            }))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(rx.try_recv().is_ok());
        let (stored, _) = store.load().await.unwrap();
        assert!(stored.last_trigger > 0);
        // Omitted ticker falls back to the default
        assert_eq!(stored.signals[0].ticker, "SOL");
    }

    #[tokio::test]
    async fn missing_timeframe_is_rejected() {
        let (state, store, _rx) = webhook_state();
        let response = handle_webhook(
            State(state),
            Json(payload(serde_json::json!({"signal": "buy"}))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (stored, _) = store.load().await.unwrap();
        assert!(stored.signals.is_empty());
    }

    #[tokio::test]
    async fn unknown_timeframe_is_rejected() {
        let (state, _, _rx) = webhook_state();
        let response = handle_webhook(
            State(state),
            Json(payload(serde_json::json!({
                "timeframe": "15min",
                "signal": "buy"
            }))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_direction_is_rejected() {
        let (state, _, _rx) = webhook_state();
        let response = handle_webhook(
            State(state),
            Json(payload(serde_json::json!({
                "timeframe": "1h",
                "signal": "short"
            }))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn details_are_preserved_verbatim() {
        let parsed = parse_payload(&payload(serde_json::json!({
            "timeframe": "4h",
            "signal": "buy",
            "ticker": "BTC",
            "details": {"rsi": 28.5, "note": "oversold"}
        })))
        .unwrap();
        assert_eq!(parsed.details.unwrap()["rsi"], 28.5);
    }
}
