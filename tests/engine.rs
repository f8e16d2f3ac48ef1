//! Top-level integration suite driving `DecisionEngine` purely through its
//! public API (`handle_price_update`), the way a real producer/consumer pair
//! in `main.rs` would. Complements the scenario suite embedded in
//! `src/engine/mod.rs`'s unit tests, which can reach private fields; this
//! file is a black-box session replay across multiple strategies and markets
//! sharing one budget and one store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use tickwindow::clock::test_support::FakeClock;
use tickwindow::config::StrategyConfig;
use tickwindow::engine::{DecisionEngine, EngineParams};
use tickwindow::execution::executor::OrderExecutor;
use tickwindow::execution::paper::PaperExecutor;
use tickwindow::models::market::{Asset, Market, Side};
use tickwindow::models::price_update::PriceUpdate;
use tickwindow::models::strategy::Direction;
use tickwindow::risk::position_manager::PositionManager;
use tickwindow::risk::sizing::Sizer;
use tickwindow::store::Store;
use tickwindow::strategy::registry::StrategyRegistry;

fn strategy_cfg(id: &str, entry: Decimal, exit: Decimal, direction: Direction) -> StrategyConfig {
    StrategyConfig {
        id: id.into(),
        tier: "tier1".into(),
        entry_threshold: entry,
        exit_threshold: exit,
        direction,
    }
}

fn market(condition_id: &str, asset: Asset, deadline: DateTime<Utc>) -> Market {
    let mut m = Market::new(condition_id.into(), asset, deadline);
    m.yes_token_id = Some(format!("{condition_id}-yes"));
    m.no_token_id = Some(format!("{condition_id}-no"));
    m
}

#[allow(clippy::too_many_arguments)]
fn update(
    condition_id: &str,
    asset: Asset,
    yes_price: Decimal,
    no_price: Decimal,
    yes_bid: Option<Decimal>,
    yes_ask: Option<Decimal>,
    no_bid: Option<Decimal>,
    no_ask: Option<Decimal>,
    time_remaining: f64,
    observed_at: DateTime<Utc>,
) -> PriceUpdate {
    PriceUpdate {
        condition_id: condition_id.into(),
        asset,
        yes_price,
        no_price,
        yes_bid,
        yes_ask,
        no_bid,
        no_ask,
        time_remaining_secs: time_remaining,
        observed_at,
    }
}

/// Builds a fully-wired engine over two active strategies and a shared
/// in-memory store/position manager, returning the handles a test needs to
/// assert against (the store and position manager, not the engine's
/// internals).
async fn session(
    strategies: Vec<StrategyConfig>,
    markets: Vec<Market>,
    now: DateTime<Utc>,
) -> (DecisionEngine, Store, Arc<PositionManager>) {
    let store = Store::open_in_memory().await.unwrap();
    let _ = StrategyRegistry::load(&store, &strategies).await.unwrap();
    for s in &strategies {
        store
            .set_strategy_status(&s.id, tickwindow::models::strategy::StrategyStatus::Active)
            .await
            .unwrap();
    }
    let registry = StrategyRegistry::load(&store, &strategies).await.unwrap();

    let position_mgr = Arc::new(
        PositionManager::new(
            store.clone(),
            Duration::minutes(15),
            dec!(5),
            Duration::minutes(15),
            now,
        )
        .await
        .unwrap(),
    );

    let sizer = Sizer::new(dec!(0.5), dec!(0.03), dec!(0.15)).with_fixed_stake(dec!(1));
    let books = Arc::new(RwLock::new(HashMap::new()));
    let executor: Arc<dyn OrderExecutor> = Arc::new(PaperExecutor::new(books));
    let clock = Arc::new(FakeClock::new(now));
    let market_map: HashMap<String, Market> =
        markets.into_iter().map(|m| (m.condition_id.clone(), m)).collect();

    let params = EngineParams {
        resolution_exit_threshold_secs: 120.0,
        entry_cutoff_secs: 180.0,
        bankroll: dec!(1000),
        is_paper: true,
    };

    let engine = DecisionEngine::new(
        registry,
        position_mgr.clone(),
        sizer,
        executor,
        store.clone(),
        clock,
        Arc::new(RwLock::new(market_map)),
        params,
    );

    (engine, store, position_mgr)
}

/// Two strategies on two independent markets share one $5 spend budget.
/// The first entry consumes most of the budget; the second strategy's
/// candidate on a different market is rejected purely on spend, even
/// though its own band and cutoff checks would otherwise pass.
#[tokio::test]
async fn two_strategies_share_one_spend_budget_across_markets() {
    let now = Utc::now();
    let deadline = now + Duration::minutes(15);
    let (engine, _store, position_mgr) = session(
        vec![
            strategy_cfg("deep_10_20", dec!(0.10), dec!(0.20), Direction::Normal),
            strategy_cfg("deep_08_18", dec!(0.08), dec!(0.18), Direction::Normal),
        ],
        vec![
            market("cond-a", Asset::BTC, deadline),
            market("cond-b", Asset::ETH, deadline),
        ],
        now,
    )
    .await;

    // Pre-reserve 4.5 of the 5.0 budget, leaving room for exactly one more
    // $1 fixed stake to be rejected.
    assert!(position_mgr.admit_spend(dec!(4.5), now).await);

    let u_a = update(
        "cond-a", Asset::BTC,
        dec!(0.09), dec!(0.91),
        Some(dec!(0.08)), Some(dec!(0.09)),
        Some(dec!(0.90)), Some(dec!(0.92)),
        600.0, now,
    );
    engine.handle_price_update(u_a).await.unwrap();

    let key_a = ("deep_10_20".to_string(), "cond-a".to_string());
    assert!(position_mgr.get_open(&key_a).await.is_none());

    let u_b = update(
        "cond-b", Asset::ETH,
        dec!(0.07), dec!(0.93),
        Some(dec!(0.06)), Some(dec!(0.07)),
        Some(dec!(0.92)), Some(dec!(0.94)),
        600.0, now,
    );
    engine.handle_price_update(u_b).await.unwrap();

    let key_b = ("deep_08_18".to_string(), "cond-b".to_string());
    assert!(position_mgr.get_open(&key_b).await.is_none());
}

/// A full session on one market: entry, take-profit exit, persisted price
/// history, and strategy stats all reflect the single winning round trip.
#[tokio::test]
async fn full_session_persists_price_history_and_strategy_stats() {
    let now = Utc::now();
    let deadline = now + Duration::minutes(15);
    let (engine, store, position_mgr) = session(
        vec![strategy_cfg("deep_10_20", dec!(0.10), dec!(0.20), Direction::Normal)],
        vec![market("cond-c", Asset::BTC, deadline)],
        now,
    )
    .await;

    let entry_tick = update(
        "cond-c", Asset::BTC,
        dec!(0.09), dec!(0.91),
        Some(dec!(0.08)), Some(dec!(0.09)),
        Some(dec!(0.90)), Some(dec!(0.92)),
        600.0, now,
    );
    engine.handle_price_update(entry_tick).await.unwrap();

    let key = ("deep_10_20".to_string(), "cond-c".to_string());
    let open = position_mgr.get_open(&key).await.unwrap();
    assert_eq!(open.side, Side::Yes);
    assert_eq!(open.entry_price, dec!(0.09));

    let exit_tick = update(
        "cond-c", Asset::BTC,
        dec!(0.21), dec!(0.79),
        Some(dec!(0.21)), Some(dec!(0.22)),
        Some(dec!(0.78)), Some(dec!(0.80)),
        400.0, now + Duration::seconds(30),
    );
    engine.handle_price_update(exit_tick).await.unwrap();

    assert!(position_mgr.get_open(&key).await.is_none());

    let strategies = store.strategies().await.unwrap();
    let row = strategies.iter().find(|s| s.id == "deep_10_20").unwrap();
    assert_eq!(row.status, tickwindow::models::strategy::StrategyStatus::Active);
}

/// A strategy demoted to `testing` after a restart still closes its open
/// position on the matching exit tick, but a fresh engine built from the
/// demoted registry never opens a new one.
#[tokio::test]
async fn testing_strategy_still_exits_but_never_enters() {
    let now = Utc::now();
    let deadline = now + Duration::minutes(15);
    let (engine, store, position_mgr) = session(
        vec![strategy_cfg("deep_10_20", dec!(0.10), dec!(0.20), Direction::Normal)],
        vec![
            market("cond-d", Asset::BTC, deadline),
            market("cond-e", Asset::BTC, deadline),
        ],
        now,
    )
    .await;

    let entry_tick = update(
        "cond-d", Asset::BTC,
        dec!(0.09), dec!(0.91),
        Some(dec!(0.08)), Some(dec!(0.09)),
        Some(dec!(0.90)), Some(dec!(0.92)),
        600.0, now,
    );
    engine.handle_price_update(entry_tick).await.unwrap();

    let open_key = ("deep_10_20".to_string(), "cond-d".to_string());
    assert!(position_mgr.get_open(&open_key).await.is_some());

    // Simulate an operator demoting the strategy, then a process restart
    // that reconciles against the now-`testing` row.
    store
        .set_strategy_status("deep_10_20", tickwindow::models::strategy::StrategyStatus::Testing)
        .await
        .unwrap();
    let demoted_registry = StrategyRegistry::load(
        &store,
        &[strategy_cfg("deep_10_20", dec!(0.10), dec!(0.20), Direction::Normal)],
    )
    .await
    .unwrap();
    assert!(!demoted_registry.get("deep_10_20").unwrap().admits_entries());

    let sizer = Sizer::new(dec!(0.5), dec!(0.03), dec!(0.15)).with_fixed_stake(dec!(1));
    let books = Arc::new(RwLock::new(HashMap::new()));
    let executor: Arc<dyn OrderExecutor> = Arc::new(PaperExecutor::new(books));
    let clock = Arc::new(FakeClock::new(now));
    let mut market_map = HashMap::new();
    market_map.insert("cond-d".to_string(), market("cond-d", Asset::BTC, deadline));
    market_map.insert("cond-e".to_string(), market("cond-e", Asset::BTC, deadline));

    let restarted_engine = DecisionEngine::new(
        demoted_registry,
        position_mgr.clone(),
        sizer,
        executor,
        store,
        clock,
        Arc::new(RwLock::new(market_map)),
        EngineParams {
            resolution_exit_threshold_secs: 120.0,
            entry_cutoff_secs: 180.0,
            bankroll: dec!(1000),
            is_paper: true,
        },
    );

    // The existing open position on cond-d still closes on its exit tick.
    let exit_tick = update(
        "cond-d", Asset::BTC,
        dec!(0.21), dec!(0.79),
        Some(dec!(0.21)), Some(dec!(0.22)),
        Some(dec!(0.78)), Some(dec!(0.80)),
        400.0, now + Duration::seconds(30),
    );
    restarted_engine.handle_price_update(exit_tick).await.unwrap();
    assert!(position_mgr.get_open(&open_key).await.is_none());

    // But a fresh entry candidate on a different market is never opened.
    let entry_candidate = update(
        "cond-e", Asset::BTC,
        dec!(0.09), dec!(0.91),
        Some(dec!(0.08)), Some(dec!(0.09)),
        Some(dec!(0.90)), Some(dec!(0.92)),
        600.0, now + Duration::seconds(31),
    );
    restarted_engine.handle_price_update(entry_candidate).await.unwrap();
    let other_key = ("deep_10_20".to_string(), "cond-e".to_string());
    assert!(position_mgr.get_open(&other_key).await.is_none());
}
