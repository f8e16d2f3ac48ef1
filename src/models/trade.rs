use super::market::{Asset, Side};
use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// Why a position was closed. Only the two the hardened core's exit state
/// machine can reach — `TimeStop` and manual/resolution-settlement variants
/// are not modeled because the core never takes those transitions (see
/// `engine::DecisionEngine`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    ResolutionExit,
}

impl ExitReason {
    pub fn is_win(&self) -> bool {
        matches!(self, ExitReason::TakeProfit)
    }
}

/// A position/trade record — one row covering both the open and closed
/// phases of its life, matching `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Option<i64>,
    pub strategy_id: String,
    pub condition_id: String,
    pub asset: Asset,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub shares: Decimal,
    pub time_remaining_at_entry: f64,
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub status: TradeStatus,
    pub is_paper: bool,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub pnl: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
    pub is_win: Option<bool>,
    pub time_remaining_at_exit: Option<f64>,
}

impl Trade {
    pub fn open(
        strategy_id: String,
        condition_id: String,
        asset: Asset,
        side: Side,
        entry_price: Decimal,
        entry_time: DateTime<Utc>,
        shares: Decimal,
        time_remaining_at_entry: f64,
        is_paper: bool,
    ) -> Self {
        Self {
            id: None,
            strategy_id,
            condition_id,
            asset,
            side,
            entry_price,
            entry_time,
            shares,
            time_remaining_at_entry,
            hour_of_day: entry_time.hour(),
            day_of_week: entry_time.weekday().num_days_from_monday(),
            status: TradeStatus::Open,
            is_paper,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            pnl: None,
            pnl_pct: None,
            is_win: None,
            time_remaining_at_exit: None,
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.strategy_id.clone(), self.condition_id.clone())
    }

    /// Close the position, computing P&L per the fixed law:
    /// `pnl_pct = (exit - entry) / entry`, `pnl = shares * entry * pnl_pct`.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
        time_remaining_at_exit: f64,
    ) {
        let pnl_pct = (exit_price - self.entry_price) / self.entry_price;
        let pnl = self.shares * self.entry_price * pnl_pct;

        self.status = TradeStatus::Closed;
        self.exit_price = Some(exit_price);
        self.exit_time = Some(exit_time);
        self.exit_reason = Some(exit_reason);
        self.pnl = Some(pnl);
        self.pnl_pct = Some(pnl_pct);
        self.is_win = Some(exit_reason.is_win());
        self.time_remaining_at_exit = Some(time_remaining_at_exit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn close_computes_pnl_law() {
        let now = Utc::now();
        let mut t = Trade::open(
            "deep_10_20".into(),
            "cond1".into(),
            Asset::BTC,
            Side::Yes,
            dec!(0.09),
            now,
            dec!(100) / dec!(0.09),
            600.0,
            true,
        );
        t.close(dec!(0.21), now + chrono::Duration::minutes(5), ExitReason::TakeProfit, 300.0);
        assert_eq!(t.is_win, Some(true));
        let expected_pnl_pct = (dec!(0.21) - dec!(0.09)) / dec!(0.09);
        assert_eq!(t.pnl_pct, Some(expected_pnl_pct));
        assert_eq!(t.pnl, Some(t.shares * t.entry_price * expected_pnl_pct));
    }

    #[test]
    fn resolution_exit_is_never_a_win() {
        let now = Utc::now();
        let mut t = Trade::open(
            "fade_85_75".into(),
            "cond2".into(),
            Asset::ETH,
            Side::No,
            dec!(0.11),
            now,
            dec!(100) / dec!(0.11),
            500.0,
            true,
        );
        // Priced above entry but still a resolution exit -- not a win.
        t.close(dec!(0.15), now + chrono::Duration::minutes(8), ExitReason::ResolutionExit, 90.0);
        assert_eq!(t.is_win, Some(false));
    }
}
