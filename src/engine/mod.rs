use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::execution::executor::OrderExecutor;
use crate::models::market::{Market, Side};
use crate::models::price_update::PriceUpdate;
use crate::models::strategy::{Direction, Strategy};
use crate::models::trade::{ExitReason, Trade};
use crate::risk::position_manager::PositionManager;
use crate::risk::sizing::Sizer;
use crate::store::Store;
use crate::strategy::registry::StrategyRegistry;

/// The fixed parameters the engine needs beyond its collaborators, drawn
/// from `Config` at startup and never mutated — see spec.md §4.3.
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    /// Exit rule 2: close once `time_remaining_secs` falls below this.
    pub resolution_exit_threshold_secs: f64,
    /// Entry rule: never open a position this close to resolution.
    pub entry_cutoff_secs: f64,
    /// Bankroll handed to the Sizer on every entry candidate.
    pub bankroll: Decimal,
    /// Whether trades placed through this engine are marked `is_paper`.
    pub is_paper: bool,
}

/// The scheduler core: for every `PriceUpdate`, runs exit checks for open
/// positions, then entry checks for flat strategies, in stable registry
/// order. Holds `Arc`/owned handles to every collaborator named in
/// spec.md §2's data-flow diagram and drives both passes from a single
/// `handle_price_update` entry point, matching `examples/original_source/
/// src/strategies/runner.py`'s `_process_price` (`_check_exits` then
/// `_check_entries` for every loaded strategy).
pub struct DecisionEngine {
    registry: StrategyRegistry,
    position_mgr: Arc<PositionManager>,
    sizer: Sizer,
    executor: Arc<dyn OrderExecutor>,
    store: Store,
    clock: Arc<dyn Clock>,
    markets: Arc<RwLock<HashMap<String, Market>>>,
    params: EngineParams,
    last_observed: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl DecisionEngine {
    pub fn new(
        registry: StrategyRegistry,
        position_mgr: Arc<PositionManager>,
        sizer: Sizer,
        executor: Arc<dyn OrderExecutor>,
        store: Store,
        clock: Arc<dyn Clock>,
        markets: Arc<RwLock<HashMap<String, Market>>>,
        params: EngineParams,
    ) -> Self {
        Self {
            registry,
            position_mgr,
            sizer,
            executor,
            store,
            clock,
            markets,
            params,
            last_observed: RwLock::new(HashMap::new()),
        }
    }

    /// Entry point for one observed tick. Persists it to `Store`, drops it
    /// if it is out of order for its market (§5's ordering contract), then
    /// evaluates every strategy in the registry's stable id order: exits
    /// first, then entries, per spec.md §4.3.
    pub async fn handle_price_update(&self, update: PriceUpdate) -> anyhow::Result<()> {
        self.store.save_price(&update).await?;

        if !self.admit_ordering(&update).await {
            warn!(
                condition_id = %update.condition_id,
                observed_at = %update.observed_at,
                "dropping out-of-order price update"
            );
            return Ok(());
        }

        let now = self.clock.now();

        for strategy in self.registry.all() {
            let key = (strategy.id.clone(), update.condition_id.clone());

            match self.position_mgr.get_open(&key).await {
                Some(trade) => self.evaluate_exit(strategy, trade, &update, now).await?,
                None => self.evaluate_entry(strategy, &update, now).await?,
            }
        }

        Ok(())
    }

    /// `observed_at` must be non-decreasing per market; a tick that arrives
    /// older than the last one seen for its `condition_id` is dropped.
    async fn admit_ordering(&self, update: &PriceUpdate) -> bool {
        let mut last = self.last_observed.write().await;
        if let Some(prev) = last.get(&update.condition_id) {
            if update.observed_at < *prev {
                return false;
            }
        }
        last.insert(update.condition_id.clone(), update.observed_at);
        true
    }

    /// §4.3-A. Only called when `PositionManager` already has an open trade
    /// for `(strategy.id, update.condition_id)`.
    async fn evaluate_exit(
        &self,
        strategy: &Strategy,
        trade: Trade,
        update: &PriceUpdate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let current_price = match trade.side {
            Side::Yes => update.yes_bid.unwrap_or(update.yes_price),
            Side::No => update.no_bid.unwrap_or(update.no_price),
        };
        let exit_target = strategy.exit_target_price();

        let reason = if current_price >= exit_target && current_price > trade.entry_price {
            Some(ExitReason::TakeProfit)
        } else if update.time_remaining_secs < self.params.resolution_exit_threshold_secs {
            Some(ExitReason::ResolutionExit)
        } else {
            None
        };

        let Some(reason) = reason else {
            return Ok(());
        };

        let token_id = self.token_id_for(&update.condition_id, trade.side).await;

        // Exit failure is logged and still persisted: the core records its
        // closing intent regardless of whether the venue confirms the
        // fill, per spec.md §4.6.
        if let Some(token_id) = token_id.as_deref() {
            if let Err(e) = self
                .executor
                .sell(trade.side, token_id, current_price, trade.shares)
                .await
            {
                warn!(
                    strategy_id = %strategy.id,
                    condition_id = %update.condition_id,
                    error = %e,
                    "sell order failed at venue; closing position anyway"
                );
            }
        } else {
            warn!(
                strategy_id = %strategy.id,
                condition_id = %update.condition_id,
                "no token id known for exit; closing position from intent alone"
            );
        }

        let mut closed = trade;
        closed.close(current_price, now, reason, update.time_remaining_secs);
        let start_cooldown = matches!(reason, ExitReason::ResolutionExit);

        self.position_mgr
            .close_trade(closed.clone(), start_cooldown, now)
            .await?;

        info!(
            strategy_id = %strategy.id,
            condition_id = %update.condition_id,
            side = ?closed.side,
            exit_price = %current_price,
            reason = ?reason,
            is_win = closed.is_win,
            pnl = ?closed.pnl,
            "position closed"
        );

        Ok(())
    }

    /// §4.3-B. Only reachable when there is no open trade for the key;
    /// the gates (enabled, cooldown, one-shot, time cutoff) run in the
    /// order the spec lists them so the cheapest checks short-circuit the
    /// Store round-trip in `ever_traded`.
    async fn evaluate_entry(
        &self,
        strategy: &Strategy,
        update: &PriceUpdate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if !strategy.admits_entries() {
            return Ok(());
        }

        let key = (strategy.id.clone(), update.condition_id.clone());
        if self.position_mgr.on_cooldown(&key, now).await {
            return Ok(());
        }
        if self.position_mgr.ever_traded(&key).await? {
            return Ok(());
        }
        if update.time_remaining_secs < self.params.entry_cutoff_secs {
            return Ok(());
        }

        let Some((side, buy_price)) = self.entry_signal(strategy, update) else {
            return Ok(());
        };

        let exit_target = strategy.exit_target_price();
        let stake = self
            .sizer
            .size(self.params.bankroll, buy_price, exit_target, None)
            .amount;
        if stake <= Decimal::ZERO {
            return Ok(());
        }

        if !self.position_mgr.admit_spend(stake, now).await {
            return Ok(());
        }

        let token_id = self.token_id_for(&update.condition_id, side).await;
        let Some(token_id) = token_id else {
            warn!(
                strategy_id = %strategy.id,
                condition_id = %update.condition_id,
                "no token id known for entry; skipping"
            );
            self.position_mgr.refund_spend(stake).await;
            return Ok(());
        };

        let shares = stake / buy_price;
        let order = self.executor.buy(side, &token_id, buy_price, shares).await;
        let order = match order {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    strategy_id = %strategy.id,
                    condition_id = %update.condition_id,
                    error = %e,
                    "buy order failed at venue; not opening a position"
                );
                self.position_mgr.refund_spend(stake).await;
                return Ok(());
            }
        };

        let trade = Trade::open(
            strategy.id.clone(),
            update.condition_id.clone(),
            update.asset,
            side,
            buy_price,
            now,
            shares,
            update.time_remaining_secs,
            self.params.is_paper,
        );
        self.position_mgr.open_trade(trade).await?;

        info!(
            strategy_id = %strategy.id,
            condition_id = %update.condition_id,
            side = ?side,
            entry_price = %buy_price,
            shares = %shares,
            order_ref = %order,
            "position opened"
        );

        Ok(())
    }

    /// The direction-specific band check of §4.3-B. Returns the traded
    /// side and its buy price iff the entry fires.
    fn entry_signal(&self, strategy: &Strategy, update: &PriceUpdate) -> Option<(Side, Decimal)> {
        match strategy.direction {
            Direction::Normal => {
                let buy_price = update.yes_ask.unwrap_or(update.yes_price);
                let lower = strategy.entry_threshold - Decimal::new(5, 2);
                let window = (lower, strategy.entry_threshold);
                if buy_price > window.0 && buy_price <= window.1 {
                    Some((Side::Yes, buy_price))
                } else {
                    None
                }
            }
            Direction::Fade => {
                let trigger_price = update.yes_bid.unwrap_or(update.yes_price);
                let width = if strategy.entry_threshold >= Decimal::new(90, 2) {
                    Decimal::new(10, 2)
                } else {
                    Decimal::new(5, 2)
                };
                let window = (strategy.entry_threshold, strategy.entry_threshold + width);
                if trigger_price >= window.0 && trigger_price < window.1 {
                    let buy_price = update.no_ask.unwrap_or(update.no_price);
                    Some((Side::No, buy_price))
                } else {
                    None
                }
            }
        }
    }

    async fn token_id_for(&self, condition_id: &str, side: Side) -> Option<String> {
        let markets = self.markets.read().await;
        let market = markets.get(condition_id)?;
        match side {
            Side::Yes => market.yes_token_id.clone(),
            Side::No => market.no_token_id.clone(),
        }
    }
}
