#![allow(dead_code)]

mod clock;
mod config;
mod engine;
mod execution;
mod feeds;
mod models;
mod risk;
mod store;
mod strategy;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info, warn};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::engine::{DecisionEngine, EngineParams};
use crate::execution::batch_submitter::BatchSubmitter;
use crate::execution::clob_client::ClobClient;
use crate::execution::executor::OrderExecutor;
use crate::execution::live::LiveExecutor;
use crate::execution::order_builder::OrderBuilder;
use crate::execution::paper::PaperExecutor;
use crate::feeds::market_discovery::MarketDiscovery;
use crate::feeds::quote_feed::QuoteFeed;
use crate::models::market::{Asset, Market, OrderBook};
use crate::risk::position_manager::PositionManager;
use crate::risk::sizing::Sizer;
use crate::store::Store;
use crate::strategy::registry::StrategyRegistry;

/// Exit codes per spec.md §6: 0 normal shutdown, 1 fatal startup error, 2
/// fatal runtime error.
const EXIT_OK: i32 = 0;
const EXIT_STARTUP_ERROR: i32 = 1;
const EXIT_RUNTIME_ERROR: i32 = 2;

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            std::process::exit(EXIT_STARTUP_ERROR);
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(e) => {
            error!(error = %e, "fatal error");
            let code = if e.downcast_ref::<StartupError>().is_some() {
                EXIT_STARTUP_ERROR
            } else {
                EXIT_RUNTIME_ERROR
            };
            std::process::exit(code);
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct StartupError(String);

async fn run() -> anyhow::Result<()> {
    info!("tickwindow starting");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".into());
    let config = Config::load(&PathBuf::from(config_path))
        .map_err(|e| StartupError(format!("config load/validate failed: {e}")))?;

    info!(mode = ?config.mode, database_path = %config.database_path, "config loaded");

    let store = Store::open(config.database_path.clone())
        .await
        .map_err(|e| StartupError(format!("failed to open store: {e}")))?;

    let clock = Arc::new(SystemClock);
    let now = clock.now();

    let registry = StrategyRegistry::load(&store, &config.strategies)
        .await
        .map_err(|e| StartupError(format!("failed to load strategy registry: {e}")))?;
    info!(count = registry.all().len(), "strategy registry loaded");

    let position_mgr = Arc::new(
        PositionManager::new(
            store.clone(),
            chrono::Duration::minutes(config.exits.cooldown_minutes),
            config.bankroll.spend_cap,
            chrono::Duration::minutes(config.bankroll.spend_window_minutes),
            now,
        )
        .await
        .map_err(|e| StartupError(format!("failed to rehydrate open positions: {e}")))?,
    );

    let sizer = Sizer::new(
        config.bankroll.kelly_fraction,
        config.bankroll.min_bet_pct,
        config.bankroll.max_bet_pct,
    );

    let books: Arc<RwLock<HashMap<String, OrderBook>>> = Arc::new(RwLock::new(HashMap::new()));
    let markets: Arc<RwLock<HashMap<String, Market>>> = Arc::new(RwLock::new(HashMap::new()));

    let executor: Arc<dyn OrderExecutor> = if config.is_live() {
        info!("wiring live executor against venue CLOB");
        let mut order_builder = OrderBuilder::new(
            config.venue.chain_id,
            config.venue.private_key.clone(),
            config.venue.funder_address.clone(),
            config.venue.signature_type,
        );
        order_builder.set_neg_risk(true);
        let clob_client = ClobClient::new(config.venue.clone());
        let submitter = BatchSubmitter::new(order_builder, clob_client);
        if let Err(e) = submitter.init_auth().await {
            warn!(error = %e, "CLOB auth init failed, falling back to L1 auth");
        }
        Arc::new(LiveExecutor::new(submitter))
    } else {
        info!("wiring paper executor");
        Arc::new(PaperExecutor::new(books.clone()))
    };

    let params = EngineParams {
        resolution_exit_threshold_secs: config.exits.resolution_exit_threshold_secs,
        entry_cutoff_secs: config.exits.entry_cutoff_secs,
        bankroll: config.bankroll.initial,
        is_paper: !config.is_live(),
    };

    let engine = Arc::new(DecisionEngine::new(
        registry,
        position_mgr.clone(),
        sizer,
        executor,
        store.clone(),
        clock.clone(),
        markets.clone(),
        params,
    ));

    let assets: Vec<Asset> = config
        .collection
        .assets
        .iter()
        .filter_map(|a| match Asset::from_str(a) {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!(asset = %a, error = %e, "skipping unrecognized asset in config");
                None
            }
        })
        .collect();
    anyhow::ensure!(!assets.is_empty(), "no recognized assets configured for collection");

    let discovery = MarketDiscovery::new(
        config.venue.gamma_api_host.clone(),
        std::time::Duration::from_secs(config.venue.http_timeout_secs),
    );
    let quote_feed = QuoteFeed::new(
        config.venue.clob_host.clone(),
        std::time::Duration::from_secs(config.venue.http_timeout_secs),
        books.clone(),
    );

    let (updates_tx, mut updates_rx) = mpsc::channel(256);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Producer: discovers markets and polls top-of-book on a fixed interval,
    // keeping `markets` in sync so the engine can resolve token ids for
    // exits/entries without a network round-trip per tick.
    let producer = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let markets = markets.clone();
        let poll_interval_secs = config.collection.poll_interval_secs;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(poll_interval_secs));
            let mut tracked: Vec<Market> = Vec::new();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = Utc::now();

                        let tracked_assets: std::collections::HashSet<Asset> =
                            tracked.iter().map(|m| m.asset).collect();
                        let missing: Vec<Asset> = assets
                            .iter()
                            .copied()
                            .filter(|a| !tracked_assets.contains(a))
                            .collect();
                        if !missing.is_empty() {
                            let discovered = discovery.discover(&missing, now).await;
                            for market in discovered {
                                info!(condition_id = %market.condition_id, asset = ?market.asset, "discovered market");
                                tracked.push(market);
                            }
                        }

                        quote_feed.tick(&mut tracked, now, &updates_tx).await;

                        let live_ids: std::collections::HashSet<String> =
                            tracked.iter().map(|m| m.condition_id.clone()).collect();
                        {
                            let mut guard = markets.write().await;
                            for market in &tracked {
                                guard.insert(market.condition_id.clone(), market.clone());
                            }
                            guard.retain(|id, _| live_ids.contains(id));
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("producer task shutting down");
                        break;
                    }
                }
            }
        })
    };

    // Consumer: every observed price update drives one pass of the decision
    // engine across all loaded strategies.
    let consumer = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let engine = engine.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates_rx.recv() => {
                        let Some(update) = update else { break };
                        if let Err(e) = engine.handle_price_update(update).await {
                            error!(error = %e, "error handling price update");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("consumer task shutting down");
                        break;
                    }
                }
            }
        })
    };

    info!("tickwindow running, press Ctrl+C to shut down");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping tasks");
    let _ = shutdown_tx.send(());

    let shutdown_wait = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        let _ = producer.await;
        let _ = consumer.await;
    })
    .await;
    if shutdown_wait.is_err() {
        warn!("graceful shutdown timed out after 30s, exiting anyway");
    }

    info!("tickwindow shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
