use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use confluence_trader::config::{AppConfig, ConnectorMode};
use confluence_trader::connector::{LivePerpClient, PerpConnector, SimulatedConnector};
use confluence_trader::decision::{DecisionEngine, GrokClient, ReasoningService};
use confluence_trader::executor::TradeExecutor;
use confluence_trader::market::{MarketDataAggregator, PriceFeed};
use confluence_trader::scheduler::{AnalysisScheduler, RunMode, TickerOutcome};
use confluence_trader::store::MemoryStateStore;
use confluence_trader::types::AccountState;
use confluence_trader::webhook::{self, WebhookState};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Port for the webhook server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Scheduler cadence in seconds (overrides INTERVAL_SECS)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Force the simulated connector regardless of CONNECTOR_LIVE
    #[arg(long)]
    simulated: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("confluence_trader=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }
    if args.simulated {
        config.connector_mode = ConnectorMode::Simulated;
    }

    info!("Starting confluence trader");
    info!("Universe: {:?}", config.assets.iter().map(|a| a.pair.as_str()).collect::<Vec<_>>());
    info!("Connector: {:?}", config.connector_mode);
    info!("Port: {}, interval: {}s", config.port, config.interval_secs);

    let store = Arc::new(MemoryStateStore::new(AccountState::default()));
    if config.connector_mode == ConnectorMode::Live {
        warn!("live connector with the in-memory store: the ledger will not survive a restart");
    }

    let connector: Arc<dyn PerpConnector> = match config.connector_mode {
        ConnectorMode::Simulated => Arc::new(SimulatedConnector::default()),
        ConnectorMode::Live => Arc::new(LivePerpClient::new(
            &config.perp_api_url,
            config.perp_api_key.clone(),
        )),
    };

    let reasoning: Arc<dyn ReasoningService> = Arc::new(GrokClient::new(
        &config.reasoning_api_url,
        &config.reasoning_model,
        &config.reasoning_api_key,
    ));

    let price_feed = PriceFeed::new(
        &config.price_api_url,
        &config.fallback_api_url,
        config.assets.clone(),
    );
    let market = Arc::new(MarketDataAggregator::new(
        Arc::new(price_feed),
        connector.clone(),
        reasoning.clone(),
    ));

    let engine = DecisionEngine::new(reasoning, config.leverage);
    let executor = TradeExecutor::new(connector.clone(), store.clone(), config.clone());
    let scheduler = AnalysisScheduler::new(
        store.clone(),
        market,
        engine,
        executor,
        connector,
        config.clone(),
    );

    // A single-slot channel: one pending nudge is enough
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);

    let webhook_state = Arc::new(WebhookState {
        store: store.clone(),
        trigger_tx,
    });
    let app = webhook::router(webhook_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Webhook server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Webhook server error: {}", e);
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("Scheduled run");
            }
            nudge = trigger_rx.recv() => {
                if nudge.is_none() {
                    break;
                }
                info!("Trigger-signal run");
            }
        }

        match scheduler.run_once().await {
            Ok(summary) => {
                match summary.mode {
                    RunMode::Skipped => info!("Run skipped, lock held elsewhere"),
                    RunMode::LightCheck => info!("Light check complete"),
                    RunMode::FullAnalysis => {
                        for outcome in &summary.outcomes {
                            match outcome {
                                TickerOutcome::Completed { ticker, action, confidence } => {
                                    info!("{}: {} (confidence {})", ticker, action, confidence);
                                }
                                TickerOutcome::Failed { ticker, reason } => {
                                    error!("{}: failed: {}", ticker, reason);
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => error!("Scheduler run failed: {}", e),
        }
    }

    Ok(())
}
