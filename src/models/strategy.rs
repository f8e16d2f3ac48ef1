use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of the entry band a strategy trades.
///
/// `Normal` buys YES as the price dips toward `entry_threshold` and takes
/// profit as it rises toward `exit_threshold`. `Fade` does the mirror image
/// on NO, entering as YES *rises* into its band and taking profit as NO
/// rises in turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Normal,
    Fade,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Normal
    }
}

/// Persisted enable/disable state, reconciled against Store at load time.
///
/// Only `Active` strategies are checked for new entries. `Testing` strategies
/// are still loaded and still have their open positions managed (exits keep
/// firing) so flipping a strategy to `testing` never stands up an orphaned
/// position — it only stops new entries. `Disabled` strategies are not
/// loaded into the live set at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Testing,
    Active,
    Disabled,
}

impl Default for StrategyStatus {
    fn default() -> Self {
        StrategyStatus::Testing
    }
}

/// A parameterized trading policy, identified by a stable string id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub tier: String,
    pub entry_threshold: Decimal,
    pub exit_threshold: Decimal,
    pub direction: Direction,
    pub status: StrategyStatus,
}

impl Strategy {
    pub fn admits_entries(&self) -> bool {
        self.status == StrategyStatus::Active
    }

    /// `(exit - entry) / entry` for `normal`; the mirrored quantity for
    /// `fade`, where the traded token is NO and its "entry"/"exit" prices
    /// are `1 - entry_threshold` / `1 - exit_threshold`.
    pub fn profit_if_win_pct(&self) -> Decimal {
        match self.direction {
            Direction::Normal => {
                (self.exit_threshold - self.entry_threshold) / self.entry_threshold
            }
            Direction::Fade => {
                let entry = Decimal::ONE - self.entry_threshold;
                let exit = Decimal::ONE - self.exit_threshold;
                (exit - entry) / entry
            }
        }
    }

    pub fn break_even_win_rate(&self) -> Decimal {
        Decimal::ONE / (Decimal::ONE + self.profit_if_win_pct())
    }

    /// The price, on the traded side, that marks take-profit — `exit_threshold`
    /// itself for `normal` (which trades YES), or its mirror `1 -
    /// exit_threshold` for `fade` (which trades NO). Shared by entry sizing
    /// and exit evaluation so both sides of a trade agree on the target.
    pub fn exit_target_price(&self) -> Decimal {
        match self.direction {
            Direction::Normal => self.exit_threshold,
            Direction::Fade => Decimal::ONE - self.exit_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn normal(entry: Decimal, exit: Decimal) -> Strategy {
        Strategy {
            id: "t".into(),
            tier: "tier1".into(),
            entry_threshold: entry,
            exit_threshold: exit,
            direction: Direction::Normal,
            status: StrategyStatus::Active,
        }
    }

    #[test]
    fn profit_if_win_normal() {
        let s = normal(dec!(0.10), dec!(0.20));
        assert_eq!(s.profit_if_win_pct(), dec!(1));
    }

    #[test]
    fn break_even_matches_profit() {
        let s = normal(dec!(0.10), dec!(0.20));
        // break_even = 1 / (1 + 1) = 0.5
        assert_eq!(s.break_even_win_rate(), dec!(0.5));
    }

    #[test]
    fn testing_status_blocks_entries_but_not_status_flag() {
        let mut s = normal(dec!(0.10), dec!(0.20));
        s.status = StrategyStatus::Testing;
        assert!(!s.admits_entries());
    }

    #[test]
    fn exit_target_price_mirrors_for_fade() {
        let mut s = normal(dec!(0.85), dec!(0.75));
        s.direction = Direction::Fade;
        assert_eq!(s.exit_target_price(), dec!(0.25));
    }

    #[test]
    fn exit_target_price_is_exit_threshold_for_normal() {
        let s = normal(dec!(0.10), dec!(0.20));
        assert_eq!(s.exit_target_price(), dec!(0.20));
    }
}
