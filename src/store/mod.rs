use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use thiserror::Error;

use crate::models::market::{Asset, Side};
use crate::models::price_update::PriceUpdate;
use crate::models::strategy::{Direction, Strategy, StrategyStatus};
use crate::models::trade::{ExitReason, Trade, TradeStatus};

const SCHEMA_SQL: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    condition_id TEXT NOT NULL,
    asset TEXT NOT NULL,
    yes_price REAL NOT NULL,
    no_price REAL NOT NULL,
    yes_bid REAL, yes_ask REAL, no_bid REAL, no_ask REAL,
    time_remaining REAL,
    observed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prices_condition_time ON prices(condition_id, observed_at);

CREATE TABLE IF NOT EXISTS strategies (
    id TEXT PRIMARY KEY,
    tier TEXT NOT NULL,
    entry_threshold REAL NOT NULL,
    exit_threshold REAL NOT NULL,
    direction TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'testing',
    total_trades INTEGER NOT NULL DEFAULT 0,
    wins INTEGER NOT NULL DEFAULT 0,
    total_pnl REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_id TEXT NOT NULL,
    condition_id TEXT NOT NULL,
    asset TEXT NOT NULL,
    side TEXT NOT NULL,
    entry_price REAL NOT NULL,
    entry_time TEXT NOT NULL,
    shares REAL NOT NULL,
    exit_price REAL, exit_time TEXT, exit_reason TEXT,
    pnl REAL, pnl_pct REAL, is_win INTEGER,
    time_remaining_at_entry REAL, time_remaining_at_exit REAL,
    hour_of_day INTEGER, day_of_week INTEGER,
    status TEXT NOT NULL DEFAULT 'open',
    is_paper INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);
CREATE INDEX IF NOT EXISTS idx_trades_strategy ON trades(strategy_id);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("blocking task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("unknown enum value in row: {0}")]
    BadEnum(String),
}

type Result<T> = std::result::Result<T, StoreError>;

/// A strategy's lifetime performance cache, read back from the
/// `strategies` table's bookkeeping columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyPerformance {
    pub total_trades: i64,
    pub wins: i64,
    pub total_pnl: rust_decimal::Decimal,
}

/// Durable storage for price history, strategy definitions/stats, and trade
/// records. A thin `parking_lot::Mutex`-guarded `Connection` shared across
/// tasks; every public method hands its blocking SQL work to
/// `tokio::task::spawn_blocking` so callers never stall the async runtime.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub async fn open(path: impl AsRef<Path> + Send + 'static) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.execute_batch(SCHEMA_SQL)?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for tests; same schema, no file. Not
    /// gated behind `cfg(test)` since the integration suite in `tests/`
    /// compiles against the crate as an ordinary dependency and needs it too.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA_SQL)?;
            Ok(conn)
        })
        .await??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn save_price(&self, update: &PriceUpdate) -> Result<()> {
        let conn = self.conn.clone();
        let update = update.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO prices (condition_id, asset, yes_price, no_price, yes_bid, yes_ask, no_bid, no_ask, time_remaining, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    update.condition_id,
                    asset_to_str(update.asset),
                    decimal_to_f64(update.yes_price),
                    decimal_to_f64(update.no_price),
                    update.yes_bid.map(decimal_to_f64),
                    update.yes_ask.map(decimal_to_f64),
                    update.no_bid.map(decimal_to_f64),
                    update.no_ask.map(decimal_to_f64),
                    update.time_remaining_secs,
                    update.observed_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    /// Rehydrates every currently-open trade, keyed by `(strategy_id,
    /// condition_id)` by the caller. Failure to run this at startup is
    /// treated as fatal by `main` — an engine that can't see its own open
    /// positions must not start admitting new ones.
    pub async fn open_trades(&self) -> Result<Vec<Trade>> {
        let conn = self.conn.clone();
        let rows = tokio::task::spawn_blocking(move || -> Result<Vec<Trade>> {
            let conn = conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, strategy_id, condition_id, asset, side, entry_price, entry_time,
                        shares, exit_price, exit_time, exit_reason, pnl, pnl_pct, is_win,
                        time_remaining_at_entry, time_remaining_at_exit, hour_of_day,
                        day_of_week, status, is_paper
                 FROM trades WHERE status = 'open'",
            )?;
            let rows = stmt
                .query_map([], row_to_trade)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await??;
        Ok(rows)
    }

    /// The one-shot rule: has this strategy ever opened a trade on this
    /// market, open or closed?
    pub async fn has_traded_market(&self, strategy_id: &str, condition_id: &str) -> Result<bool> {
        let conn = self.conn.clone();
        let strategy_id = strategy_id.to_string();
        let condition_id = condition_id.to_string();
        let found = tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = conn.lock();
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM trades WHERE strategy_id = ?1 AND condition_id = ?2",
                params![strategy_id, condition_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await??;
        Ok(found)
    }

    /// Persists a newly opened trade and returns its assigned row id.
    pub async fn open_trade(&self, trade: &Trade) -> Result<i64> {
        let conn = self.conn.clone();
        let trade = trade.clone();
        let id = tokio::task::spawn_blocking(move || -> Result<i64> {
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO trades (strategy_id, condition_id, asset, side, entry_price,
                    entry_time, shares, time_remaining_at_entry, hour_of_day, day_of_week,
                    status, is_paper)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'open', ?11)",
                params![
                    trade.strategy_id,
                    trade.condition_id,
                    asset_to_str(trade.asset),
                    side_to_str(trade.side),
                    decimal_to_f64(trade.entry_price),
                    trade.entry_time.to_rfc3339(),
                    decimal_to_f64(trade.shares),
                    trade.time_remaining_at_entry,
                    trade.hour_of_day,
                    trade.day_of_week,
                    trade.is_paper as i64,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await??;
        Ok(id)
    }

    /// Updates a trade in place with its exit fields. `trade.id` must be set
    /// (i.e. it came from `open_trade` or `open_trades`).
    pub async fn close_trade(&self, trade: &Trade) -> Result<()> {
        let id = trade
            .id
            .expect("close_trade called on a trade with no row id");
        let conn = self.conn.clone();
        let trade = trade.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock();
            conn.execute(
                "UPDATE trades SET status = 'closed', exit_price = ?1, exit_time = ?2,
                    exit_reason = ?3, pnl = ?4, pnl_pct = ?5, is_win = ?6,
                    time_remaining_at_exit = ?7
                 WHERE id = ?8",
                params![
                    trade.exit_price.map(decimal_to_f64),
                    trade.exit_time.map(|t| t.to_rfc3339()),
                    trade.exit_reason.map(exit_reason_to_str),
                    trade.pnl.map(decimal_to_f64),
                    trade.pnl_pct.map(decimal_to_f64),
                    trade.is_win.map(|w| w as i64),
                    trade.time_remaining_at_exit,
                    id,
                ],
            )?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    /// Loads all persisted strategy rows.
    pub async fn strategies(&self) -> Result<Vec<Strategy>> {
        let conn = self.conn.clone();
        let rows = tokio::task::spawn_blocking(move || -> Result<Vec<Strategy>> {
            let conn = conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, tier, entry_threshold, exit_threshold, direction, status FROM strategies",
            )?;
            let rows = stmt
                .query_map([], row_to_strategy)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await??;
        Ok(rows)
    }

    /// Inserts any strategy from `defaults` not already present in the
    /// table, defaulting its status to `testing`. Existing rows are left
    /// untouched so a previously promoted-to-`active` strategy doesn't get
    /// silently reset on restart.
    pub async fn upsert_strategy_defaults(&self, defaults: &[Strategy]) -> Result<()> {
        let conn = self.conn.clone();
        let defaults = defaults.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock();
            for s in &defaults {
                conn.execute(
                    "INSERT INTO strategies (id, tier, entry_threshold, exit_threshold, direction, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        s.id,
                        s.tier,
                        decimal_to_f64(s.entry_threshold),
                        decimal_to_f64(s.exit_threshold),
                        direction_to_str(s.direction),
                        status_to_str(s.status),
                    ],
                )?;
            }
            Ok(())
        })
        .await??;
        Ok(())
    }

    /// Promotes/demotes a strategy's persisted status — the operator-facing
    /// half of §4.3's `testing`/`active`/`disabled` reconciliation; takes
    /// effect the next time `StrategyRegistry::load` reconciles against
    /// this table.
    pub async fn set_strategy_status(
        &self,
        strategy_id: &str,
        status: StrategyStatus,
    ) -> Result<()> {
        let conn = self.conn.clone();
        let strategy_id = strategy_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock();
            conn.execute(
                "UPDATE strategies SET status = ?1 WHERE id = ?2",
                params![status_to_str(status), strategy_id],
            )?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    /// Reads back a strategy's performance cache (`total_trades`, `wins`,
    /// `total_pnl`), maintained by `update_strategy_stats` on every close.
    /// No reporting surface in this core consumes it yet — it exists
    /// because the Store already owns the columns it would read — but it
    /// lets an out-of-core dashboard query without touching `trades`.
    pub async fn strategy_performance(&self, strategy_id: &str) -> Result<Option<StrategyPerformance>> {
        let conn = self.conn.clone();
        let strategy_id = strategy_id.to_string();
        let row = tokio::task::spawn_blocking(move || -> Result<Option<StrategyPerformance>> {
            let conn = conn.lock();
            conn.query_row(
                "SELECT total_trades, wins, total_pnl FROM strategies WHERE id = ?1",
                params![strategy_id],
                |row| {
                    Ok(StrategyPerformance {
                        total_trades: row.get(0)?,
                        wins: row.get(1)?,
                        total_pnl: f64_to_decimal(row.get(2)?),
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::from(other)),
            })
        })
        .await??;
        Ok(row)
    }

    pub async fn update_strategy_stats(
        &self,
        strategy_id: &str,
        pnl: rust_decimal::Decimal,
        is_win: bool,
    ) -> Result<()> {
        let conn = self.conn.clone();
        let strategy_id = strategy_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock();
            conn.execute(
                "UPDATE strategies SET total_trades = total_trades + 1,
                    wins = wins + ?1, total_pnl = total_pnl + ?2
                 WHERE id = ?3",
                params![is_win as i64, decimal_to_f64(pnl), strategy_id],
            )?;
            Ok(())
        })
        .await??;
        Ok(())
    }
}

fn decimal_to_f64(d: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}

fn f64_to_decimal(f: f64) -> rust_decimal::Decimal {
    rust_decimal::Decimal::try_from(f).unwrap_or_default()
}

fn asset_to_str(a: Asset) -> &'static str {
    match a {
        Asset::BTC => "BTC",
        Asset::ETH => "ETH",
        Asset::SOL => "SOL",
        Asset::XRP => "XRP",
    }
}

fn asset_from_str(s: &str) -> Result<Asset> {
    match s {
        "BTC" => Ok(Asset::BTC),
        "ETH" => Ok(Asset::ETH),
        "SOL" => Ok(Asset::SOL),
        "XRP" => Ok(Asset::XRP),
        other => Err(StoreError::BadEnum(format!("asset: {other}"))),
    }
}

fn side_to_str(s: Side) -> &'static str {
    match s {
        Side::Yes => "yes",
        Side::No => "no",
    }
}

fn side_from_str(s: &str) -> Result<Side> {
    match s {
        "yes" => Ok(Side::Yes),
        "no" => Ok(Side::No),
        other => Err(StoreError::BadEnum(format!("side: {other}"))),
    }
}

fn direction_to_str(d: Direction) -> &'static str {
    match d {
        Direction::Normal => "normal",
        Direction::Fade => "fade",
    }
}

fn direction_from_str(s: &str) -> Result<Direction> {
    match s {
        "normal" => Ok(Direction::Normal),
        "fade" => Ok(Direction::Fade),
        other => Err(StoreError::BadEnum(format!("direction: {other}"))),
    }
}

fn status_to_str(s: StrategyStatus) -> &'static str {
    match s {
        StrategyStatus::Testing => "testing",
        StrategyStatus::Active => "active",
        StrategyStatus::Disabled => "disabled",
    }
}

fn status_from_str(s: &str) -> Result<StrategyStatus> {
    match s {
        "testing" => Ok(StrategyStatus::Testing),
        "active" => Ok(StrategyStatus::Active),
        "disabled" => Ok(StrategyStatus::Disabled),
        other => Err(StoreError::BadEnum(format!("status: {other}"))),
    }
}

fn exit_reason_to_str(r: ExitReason) -> &'static str {
    match r {
        ExitReason::TakeProfit => "take_profit",
        ExitReason::ResolutionExit => "resolution_exit",
    }
}

fn exit_reason_from_str(s: &str) -> Result<ExitReason> {
    match s {
        "take_profit" => Ok(ExitReason::TakeProfit),
        "resolution_exit" => Ok(ExitReason::ResolutionExit),
        other => Err(StoreError::BadEnum(format!("exit_reason: {other}"))),
    }
}

fn row_to_strategy(row: &rusqlite::Row) -> rusqlite::Result<Strategy> {
    let direction: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(Strategy {
        id: row.get(0)?,
        tier: row.get(1)?,
        entry_threshold: f64_to_decimal(row.get(2)?),
        exit_threshold: f64_to_decimal(row.get(3)?),
        direction: direction_from_str(&direction)
            .map_err(|e| rusqlite::Error::InvalidColumnType(4, e.to_string(), rusqlite::types::Type::Text))?,
        status: status_from_str(&status)
            .map_err(|e| rusqlite::Error::InvalidColumnType(5, e.to_string(), rusqlite::types::Type::Text))?,
    })
}

fn row_to_trade(row: &rusqlite::Row) -> rusqlite::Result<Trade> {
    let asset: String = row.get(3)?;
    let side: String = row.get(4)?;
    let entry_time: String = row.get(6)?;
    let exit_time: Option<String> = row.get(9)?;
    let exit_reason: Option<String> = row.get(10)?;
    let status: String = row.get(18)?;
    let is_paper: i64 = row.get(19)?;

    let bad = |col: usize, e: StoreError| {
        rusqlite::Error::InvalidColumnType(col, e.to_string(), rusqlite::types::Type::Text)
    };

    Ok(Trade {
        id: row.get(0)?,
        strategy_id: row.get(1)?,
        condition_id: row.get(2)?,
        asset: asset_from_str(&asset).map_err(|e| bad(3, e))?,
        side: side_from_str(&side).map_err(|e| bad(4, e))?,
        entry_price: f64_to_decimal(row.get(5)?),
        entry_time: DateTime::parse_from_rfc3339(&entry_time)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::InvalidColumnType(6, e.to_string(), rusqlite::types::Type::Text))?,
        shares: f64_to_decimal(row.get(7)?),
        exit_price: row.get::<_, Option<f64>>(8)?.map(f64_to_decimal),
        exit_time: exit_time
            .map(|t| {
                DateTime::parse_from_rfc3339(&t)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| bad(9, e))
            })
            .transpose()?,
        exit_reason: exit_reason
            .map(|r| exit_reason_from_str(&r).map_err(|e| bad(10, e)))
            .transpose()?,
        pnl: row.get::<_, Option<f64>>(11)?.map(f64_to_decimal),
        pnl_pct: row.get::<_, Option<f64>>(12)?.map(f64_to_decimal),
        is_win: row.get::<_, Option<i64>>(13)?.map(|v| v != 0),
        time_remaining_at_entry: row.get(14)?,
        time_remaining_at_exit: row.get(15)?,
        hour_of_day: row.get(16)?,
        day_of_week: row.get(17)?,
        status: if status == "open" {
            TradeStatus::Open
        } else {
            TradeStatus::Closed
        },
        is_paper: is_paper != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{Asset, Side};
    use rust_decimal_macros::dec;

    fn sample_strategy() -> Strategy {
        Strategy {
            id: "deep_10_20".into(),
            tier: "tier1".into(),
            entry_threshold: dec!(0.10),
            exit_threshold: dec!(0.20),
            direction: Direction::Normal,
            status: StrategyStatus::Testing,
        }
    }

    #[tokio::test]
    async fn open_then_close_round_trips_through_sqlite() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();
        let mut trade = Trade::open(
            "deep_10_20".into(),
            "cond1".into(),
            Asset::BTC,
            Side::Yes,
            dec!(0.10),
            now,
            dec!(100),
            600.0,
            true,
        );
        let id = store.open_trade(&trade).await.unwrap();
        trade.id = Some(id);

        let open = store.open_trades().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].condition_id, "cond1");

        trade.close(dec!(0.20), now + chrono::Duration::minutes(2), ExitReason::TakeProfit, 300.0);
        store.close_trade(&trade).await.unwrap();

        let open_after = store.open_trades().await.unwrap();
        assert!(open_after.is_empty());
    }

    #[tokio::test]
    async fn has_traded_market_reflects_any_trade_ever() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(!store.has_traded_market("deep_10_20", "cond1").await.unwrap());

        let trade = Trade::open(
            "deep_10_20".into(),
            "cond1".into(),
            Asset::BTC,
            Side::Yes,
            dec!(0.10),
            Utc::now(),
            dec!(100),
            600.0,
            true,
        );
        store.open_trade(&trade).await.unwrap();
        assert!(store.has_traded_market("deep_10_20", "cond1").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_strategy_defaults_does_not_clobber_promoted_status() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_strategy_defaults(&[sample_strategy()])
            .await
            .unwrap();

        // Simulate an operator promotion to active, then reload defaults.
        {
            let conn = store.conn.lock();
            conn.execute(
                "UPDATE strategies SET status = 'active' WHERE id = 'deep_10_20'",
                [],
            )
            .unwrap();
        }
        store
            .upsert_strategy_defaults(&[sample_strategy()])
            .await
            .unwrap();

        let strategies = store.strategies().await.unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].status, StrategyStatus::Active);
    }

    #[tokio::test]
    async fn strategy_performance_reflects_closed_trades() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_strategy_defaults(&[sample_strategy()])
            .await
            .unwrap();

        assert!(store.strategy_performance("deep_10_20").await.unwrap().is_some());
        assert!(store.strategy_performance("missing").await.unwrap().is_none());

        store
            .update_strategy_stats("deep_10_20", dec!(12.5), true)
            .await
            .unwrap();
        store
            .update_strategy_stats("deep_10_20", dec!(-3.0), false)
            .await
            .unwrap();

        let perf = store.strategy_performance("deep_10_20").await.unwrap().unwrap();
        assert_eq!(perf.total_trades, 2);
        assert_eq!(perf.wins, 1);
        assert_eq!(perf.total_pnl, dec!(9.5));
    }

    #[tokio::test]
    async fn save_price_is_queryable() {
        let store = Store::open_in_memory().await.unwrap();
        let update = PriceUpdate {
            condition_id: "cond1".into(),
            asset: Asset::BTC,
            yes_price: dec!(0.12),
            no_price: dec!(0.88),
            yes_bid: Some(dec!(0.11)),
            yes_ask: Some(dec!(0.13)),
            no_bid: Some(dec!(0.87)),
            no_ask: Some(dec!(0.89)),
            time_remaining_secs: 540.0,
            observed_at: Utc::now(),
        };
        store.save_price(&update).await.unwrap();

        let conn = store.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM prices", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
