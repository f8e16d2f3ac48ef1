use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::trade::Trade;
use crate::store::Store;

pub type TradeKey = (String, String);

#[derive(Debug, Error)]
pub enum PositionManagerError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

struct Cooldown {
    until: DateTime<Utc>,
}

struct SpendWindow {
    window_start: DateTime<Utc>,
    spent_so_far: Decimal,
}

struct Inner {
    open_trades: HashMap<TradeKey, Trade>,
    cooldowns: HashMap<TradeKey, Cooldown>,
    spend: SpendWindow,
}

/// Authoritative in-process gatekeeper for entries and exits, per §4.4.
///
/// `open_trades` is an in-memory cache rehydrated from `Store` at startup —
/// `Store` itself remains the source of truth, this cache only exists so
/// `DecisionEngine` never needs to await a query on its hot path. Failing
/// to rehydrate is fatal: an engine that can't see its own open positions
/// would double-buy into markets it already holds.
pub struct PositionManager {
    store: Store,
    inner: Arc<RwLock<Inner>>,
    cooldown_duration: Duration,
    spend_cap: Decimal,
    window_duration: Duration,
}

impl PositionManager {
    /// Rehydrates `open_trades` from Store. Fatal on failure by design —
    /// callers should propagate the error out of `main` via `anyhow::bail!`.
    pub async fn new(
        store: Store,
        cooldown_duration: Duration,
        spend_cap: Decimal,
        window_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, PositionManagerError> {
        let rows = store.open_trades().await?;
        let mut open_trades = HashMap::with_capacity(rows.len());
        for trade in rows {
            open_trades.insert(trade.key(), trade);
        }

        info!(count = open_trades.len(), "rehydrated open trades from store");

        Ok(Self {
            store,
            inner: Arc::new(RwLock::new(Inner {
                open_trades,
                cooldowns: HashMap::new(),
                spend: SpendWindow {
                    window_start: now,
                    spent_so_far: Decimal::ZERO,
                },
            })),
            cooldown_duration,
            spend_cap,
            window_duration,
        })
    }

    pub async fn has_open(&self, key: &TradeKey) -> bool {
        self.inner.read().await.open_trades.contains_key(key)
    }

    /// The open trade for `key`, if any — used by `DecisionEngine` to read
    /// `entry_price`/`side`/`shares` when evaluating an exit.
    pub async fn get_open(&self, key: &TradeKey) -> Option<Trade> {
        self.inner.read().await.open_trades.get(key).cloned()
    }

    pub async fn on_cooldown(&self, key: &TradeKey, now: DateTime<Utc>) -> bool {
        self.inner
            .read()
            .await
            .cooldowns
            .get(key)
            .map(|c| c.until > now)
            .unwrap_or(false)
    }

    /// One-shot rule: has this strategy ever opened a trade on this market,
    /// open or closed? Always asks Store directly — this is not cached.
    pub async fn ever_traded(&self, key: &TradeKey) -> Result<bool, PositionManagerError> {
        Ok(self.store.has_traded_market(&key.0, &key.1).await?)
    }

    /// Rolling spend-window admission gate. Resets the window if it has
    /// aged past `window_duration`, then admits iff `spent_so_far + stake
    /// <= spend_cap`. Admission mutates `spent_so_far` in place.
    pub async fn admit_spend(&self, stake: Decimal, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write().await;
        if now - inner.spend.window_start > self.window_duration {
            inner.spend.window_start = now;
            inner.spend.spent_so_far = Decimal::ZERO;
        }
        if inner.spend.spent_so_far + stake <= self.spend_cap {
            inner.spend.spent_so_far += stake;
            true
        } else {
            false
        }
    }

    /// Persists a new open trade and caches it under its key. Entry on
    /// `OrderExecutor` failure must never reach this call — aborts before
    /// persistence per §4.6's failure model.
    pub async fn open_trade(&self, trade: Trade) -> Result<Trade, PositionManagerError> {
        let key = trade.key();
        let id = self.store.open_trade(&trade).await?;
        let mut trade = trade;
        trade.id = Some(id);

        let mut inner = self.inner.write().await;
        inner.open_trades.insert(key, trade.clone());
        Ok(trade)
    }

    /// Persists the close, evicts the key from the open-trade cache, and
    /// starts a cooldown for resolution exits only — a take-profit exit
    /// does not block re-entry on the same market (the one-shot rule via
    /// `ever_traded` already prevents that for a single strategy).
    pub async fn close_trade(
        &self,
        mut trade: Trade,
        start_cooldown: bool,
        now: DateTime<Utc>,
    ) -> Result<Trade, PositionManagerError> {
        let key = trade.key();
        self.store.close_trade(&trade).await?;

        if let (Some(pnl), Some(is_win)) = (trade.pnl, trade.is_win) {
            self.store
                .update_strategy_stats(&trade.strategy_id, pnl, is_win)
                .await?;
        }

        let mut inner = self.inner.write().await;
        inner.open_trades.remove(&key);
        if start_cooldown {
            inner.cooldowns.insert(
                key,
                Cooldown {
                    until: now + self.cooldown_duration,
                },
            );
        }
        Ok(trade)
    }

    pub async fn open_trade_count(&self) -> usize {
        self.inner.read().await.open_trades.len()
    }

    /// Rolls back a reservation made by `admit_spend` when the entry it was
    /// reserved for fails at the executor — only *successful* entries count
    /// against the budget (testable property §8.6), but the admission check
    /// must still run before the order is placed, so a failure needs to
    /// give the stake back.
    pub async fn refund_spend(&self, stake: Decimal) {
        let mut inner = self.inner.write().await;
        inner.spend.spent_so_far = (inner.spend.spent_so_far - stake).max(Decimal::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{Asset, Side};
    use crate::models::trade::ExitReason;
    use rust_decimal_macros::dec;

    fn key() -> TradeKey {
        ("deep_10_20".into(), "cond1".into())
    }

    async fn manager(now: DateTime<Utc>) -> PositionManager {
        let store = Store::open_in_memory().await.unwrap();
        PositionManager::new(
            store,
            Duration::minutes(15),
            dec!(5),
            Duration::minutes(15),
            now,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn open_then_has_open_then_close_evicts() {
        let now = Utc::now();
        let pm = manager(now).await;
        let (strategy_id, condition_id) = key();
        assert!(!pm.has_open(&key()).await);

        let trade = Trade::open(
            strategy_id.clone(),
            condition_id.clone(),
            Asset::BTC,
            Side::Yes,
            dec!(0.10),
            now,
            dec!(100),
            600.0,
            true,
        );
        let trade = pm.open_trade(trade).await.unwrap();
        assert!(pm.has_open(&key()).await);

        let mut trade = trade;
        trade.close(dec!(0.20), now + Duration::minutes(2), ExitReason::TakeProfit, 300.0);
        pm.close_trade(trade, false, now + Duration::minutes(2))
            .await
            .unwrap();
        assert!(!pm.has_open(&key()).await);
    }

    #[tokio::test]
    async fn resolution_exit_starts_a_cooldown() {
        let now = Utc::now();
        let pm = manager(now).await;
        let trade = Trade::open(
            key().0,
            key().1,
            Asset::ETH,
            Side::No,
            dec!(0.11),
            now,
            dec!(100),
            500.0,
            true,
        );
        let mut trade = pm.open_trade(trade).await.unwrap();
        trade.close(dec!(0.15), now + Duration::minutes(8), ExitReason::ResolutionExit, 90.0);
        pm.close_trade(trade, true, now + Duration::minutes(8))
            .await
            .unwrap();

        assert!(pm.on_cooldown(&key(), now + Duration::minutes(9)).await);
        assert!(!pm.on_cooldown(&key(), now + Duration::minutes(25)).await);
    }

    #[tokio::test]
    async fn ever_traded_checks_store_not_cache() {
        let now = Utc::now();
        let pm = manager(now).await;
        assert!(!pm.ever_traded(&key()).await.unwrap());

        let trade = Trade::open(
            key().0,
            key().1,
            Asset::BTC,
            Side::Yes,
            dec!(0.10),
            now,
            dec!(100),
            600.0,
            true,
        );
        pm.open_trade(trade).await.unwrap();
        assert!(pm.ever_traded(&key()).await.unwrap());
    }

    #[tokio::test]
    async fn refund_spend_restores_budget_after_a_failed_entry() {
        let now = Utc::now();
        let pm = manager(now).await;

        assert!(pm.admit_spend(dec!(4.5), now).await);
        pm.refund_spend(dec!(4.5)).await;
        // Full budget should be available again.
        assert!(pm.admit_spend(dec!(4.5), now).await);
    }

    #[tokio::test]
    async fn get_open_returns_the_cached_trade() {
        let now = Utc::now();
        let pm = manager(now).await;
        assert!(pm.get_open(&key()).await.is_none());

        let trade = Trade::open(
            key().0,
            key().1,
            Asset::BTC,
            Side::Yes,
            dec!(0.10),
            now,
            dec!(100),
            600.0,
            true,
        );
        pm.open_trade(trade).await.unwrap();
        let fetched = pm.get_open(&key()).await.unwrap();
        assert_eq!(fetched.entry_price, dec!(0.10));
    }

    #[tokio::test]
    async fn admit_spend_enforces_rolling_window_cap() {
        let now = Utc::now();
        let pm = manager(now).await;

        assert!(pm.admit_spend(dec!(4.5), now).await);
        assert!(!pm.admit_spend(dec!(1.0), now + Duration::minutes(1)).await);

        // Window resets after 15 minutes.
        assert!(
            pm.admit_spend(dec!(1.0), now + Duration::minutes(16))
                .await
        );
    }
}
