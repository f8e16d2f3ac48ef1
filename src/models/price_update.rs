use super::market::Asset;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable observation of a market's quote at one instant. Appended to
/// Store as a time series and passed in-process to `DecisionEngine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub condition_id: String,
    pub asset: Asset,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub yes_bid: Option<Decimal>,
    pub yes_ask: Option<Decimal>,
    pub no_bid: Option<Decimal>,
    pub no_ask: Option<Decimal>,
    pub time_remaining_secs: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceUpdate {
    /// §4.2's validity check: never propagate a negative or >1 probability.
    pub fn is_valid(&self) -> bool {
        let in_range = |d: Decimal| d >= Decimal::ZERO && d <= Decimal::ONE;
        in_range(self.yes_price)
            && in_range(self.no_price)
            && self.yes_bid.map(in_range).unwrap_or(true)
            && self.yes_ask.map(in_range).unwrap_or(true)
            && self.no_bid.map(in_range).unwrap_or(true)
            && self.no_ask.map(in_range).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base() -> PriceUpdate {
        PriceUpdate {
            condition_id: "c1".into(),
            asset: Asset::BTC,
            yes_price: dec!(0.5),
            no_price: dec!(0.5),
            yes_bid: Some(dec!(0.49)),
            yes_ask: Some(dec!(0.51)),
            no_bid: Some(dec!(0.49)),
            no_ask: Some(dec!(0.51)),
            time_remaining_secs: 600.0,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_out_of_range_price() {
        let mut u = base();
        u.yes_price = dec!(1.2);
        assert!(!u.is_valid());
    }

    #[test]
    fn rejects_negative_price() {
        let mut u = base();
        u.no_bid = Some(dec!(-0.1));
        assert!(!u.is_valid());
    }

    #[test]
    fn accepts_clean_update() {
        assert!(base().is_valid());
    }
}
