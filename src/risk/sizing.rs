use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fractional-Kelly stake recommendation, per §4.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetSize {
    pub amount: Decimal,
    pub pct: Decimal,
    pub kelly: Decimal,
    pub confidence: Decimal,
    pub rationale: String,
}

impl BetSize {
    fn zero(rationale: impl Into<String>) -> Self {
        Self {
            amount: Decimal::ZERO,
            pct: Decimal::ZERO,
            kelly: Decimal::ZERO,
            confidence: Decimal::ZERO,
            rationale: rationale.into(),
        }
    }
}

/// Computes recommended stakes for a candidate entry using fractional
/// Kelly, bounded by a fixed bankroll fraction. A `fixed_stake_override`
/// substitutes a constant test stake ahead of any Kelly math, grounded on
/// spec.md §4.5's "a test mode may substitute a fixed amount".
pub struct Sizer {
    pub kelly_fraction: Decimal,
    pub min_bet_pct: Decimal,
    pub max_bet_pct: Decimal,
    pub fixed_stake_override: Option<Decimal>,
}

impl Sizer {
    pub fn new(kelly_fraction: Decimal, min_bet_pct: Decimal, max_bet_pct: Decimal) -> Self {
        Self {
            kelly_fraction,
            min_bet_pct,
            max_bet_pct,
            fixed_stake_override: None,
        }
    }

    pub fn with_fixed_stake(mut self, amount: Decimal) -> Self {
        self.fixed_stake_override = Some(amount);
        self
    }

    /// `bankroll`, entry price `p`, target exit price `q`, and an optional
    /// supplied win rate. When `w` is omitted, it defaults to break-even
    /// plus a flat 5-point edge.
    pub fn size(
        &self,
        bankroll: Decimal,
        entry_price: Decimal,
        exit_price: Decimal,
        win_rate: Option<Decimal>,
    ) -> BetSize {
        if let Some(amount) = self.fixed_stake_override {
            let pct = if bankroll > Decimal::ZERO {
                amount / bankroll
            } else {
                Decimal::ZERO
            };
            return BetSize {
                amount,
                pct,
                kelly: Decimal::ZERO,
                confidence: Decimal::ONE,
                rationale: "fixed stake override".into(),
            };
        }

        if entry_price <= Decimal::ZERO {
            return BetSize::zero("entry price must be positive");
        }

        let profit_per_dollar = (exit_price - entry_price) / entry_price;
        let loss = Decimal::ONE;
        if profit_per_dollar <= Decimal::ZERO {
            return BetSize::zero("non-positive edge: exit price does not exceed entry price");
        }
        let win_loss_ratio = profit_per_dollar / loss;

        let break_even = loss / (loss + profit_per_dollar);
        let w = win_rate.unwrap_or(break_even + Decimal::new(5, 2));

        let raw_kelly = w - (Decimal::ONE - w) / win_loss_ratio;
        if raw_kelly <= Decimal::ZERO {
            return BetSize::zero("raw Kelly fraction is non-positive");
        }

        let scaled = raw_kelly * self.kelly_fraction;
        let clamped_pct = scaled.clamp(self.min_bet_pct, self.max_bet_pct);
        let amount = bankroll * clamped_pct;

        BetSize {
            amount,
            pct: clamped_pct,
            kelly: raw_kelly,
            confidence: w,
            rationale: format!(
                "kelly={raw_kelly}, scaled={scaled}, clamped to [{}, {}]",
                self.min_bet_pct, self.max_bet_pct
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sizer() -> Sizer {
        Sizer::new(dec!(0.50), dec!(0.03), dec!(0.15))
    }

    #[test]
    fn deep_10_20_sizes_a_positive_stake() {
        let b = sizer().size(dec!(1000), dec!(0.10), dec!(0.20), None);
        assert!(b.amount > Decimal::ZERO);
        assert!(b.pct >= dec!(0.03) && b.pct <= dec!(0.15));
    }

    #[test]
    fn non_positive_edge_returns_zero() {
        let b = sizer().size(dec!(1000), dec!(0.20), dec!(0.10), None);
        assert_eq!(b.amount, Decimal::ZERO);
    }

    #[test]
    fn clamps_to_max_bet_pct_on_strong_edge() {
        // A very favorable ratio should hit the 15% ceiling, not the raw Kelly value.
        let b = sizer().size(dec!(1000), dec!(0.05), dec!(0.90), Some(dec!(0.9)));
        assert_eq!(b.pct, dec!(0.15));
        assert_eq!(b.amount, dec!(150));
    }

    #[test]
    fn clamps_to_min_bet_pct_on_thin_edge() {
        // profit_per_dollar = 0.2, win_loss_ratio = 0.2, raw kelly = 0.84 - 0.16/0.2 = 0.04,
        // scaled by 0.5 -> 0.02, below the 3% floor.
        let b = sizer().size(dec!(1000), dec!(0.10), dec!(0.12), Some(dec!(0.84)));
        assert_eq!(b.pct, dec!(0.03));
    }

    #[test]
    fn fixed_stake_override_bypasses_kelly() {
        let s = sizer().with_fixed_stake(dec!(25));
        let b = s.size(dec!(1000), dec!(0.10), dec!(0.20), None);
        assert_eq!(b.amount, dec!(25));
        assert_eq!(b.kelly, Decimal::ZERO);
    }

    #[test]
    fn win_rate_defaults_to_break_even_plus_five_points() {
        // entry 0.10, exit 0.20 -> profit_per_dollar = 1.0 -> break_even = 0.5 -> w = 0.55
        let b = sizer().size(dec!(1000), dec!(0.10), dec!(0.20), None);
        assert_eq!(b.confidence, dec!(0.55));
    }
}
