use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    BTC,
    ETH,
    SOL,
    XRP,
}

impl Asset {
    pub fn slug_prefix(&self) -> &'static str {
        match self {
            Asset::BTC => "btc",
            Asset::ETH => "eth",
            Asset::SOL => "sol",
            Asset::XRP => "xrp",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.slug_prefix()
    }
}

impl std::str::FromStr for Asset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Asset::BTC),
            "ETH" => Ok(Asset::ETH),
            "SOL" => Ok(Asset::SOL),
            "XRP" => Ok(Asset::XRP),
            other => anyhow::bail!("unknown asset {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

/// A short-lived binary outcome on one asset.
///
/// `condition_id` is the stable identity across the market's life. Token ids
/// arrive from `MarketDiscovery` once the venue has assigned them; a market
/// missing either is not yet tradable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub asset: Asset,
    pub resolution_deadline: DateTime<Utc>,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub yes_bid: Option<Decimal>,
    pub yes_ask: Option<Decimal>,
    pub no_bid: Option<Decimal>,
    pub no_ask: Option<Decimal>,
}

impl Market {
    pub fn new(condition_id: String, asset: Asset, resolution_deadline: DateTime<Utc>) -> Self {
        Self {
            condition_id,
            asset,
            resolution_deadline,
            yes_token_id: None,
            no_token_id: None,
            yes_price: Decimal::new(5, 1), // 0.5 placeholder until first quote
            no_price: Decimal::new(5, 1),
            yes_bid: None,
            yes_ask: None,
            no_bid: None,
            no_ask: None,
        }
    }

    pub fn has_tokens(&self) -> bool {
        self.yes_token_id.is_some() && self.no_token_id.is_some()
    }

    pub fn time_remaining_secs(&self, now: DateTime<Utc>) -> f64 {
        if now >= self.resolution_deadline {
            return 0.0;
        }
        (self.resolution_deadline - now).num_milliseconds() as f64 / 1000.0
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.resolution_deadline
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub token_id: String,
    pub bids: BTreeMap<Decimal, Decimal>, // price -> size, descending by price
    pub asks: BTreeMap<Decimal, Decimal>, // price -> size, ascending by price
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(&p, &s)| (p, s))
    }

    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(&p, &s)| (p, s))
    }

    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Walk asks to find the volume-weighted fill price for a BUY of
    /// `shares` units. Returns `(avg_price, filled_shares)`; `filled_shares`
    /// is less than `shares` if the book can't fully absorb the order.
    pub fn calculate_buy_market_price(&self, shares: Decimal) -> Option<(Decimal, Decimal)> {
        let mut cumulative_shares = Decimal::ZERO;
        let mut cumulative_cost = Decimal::ZERO;
        for (&price, &size) in self.asks.iter() {
            if price <= Decimal::ZERO || size <= Decimal::ZERO {
                continue;
            }
            let take = size.min(shares - cumulative_shares);
            cumulative_cost += price * take;
            cumulative_shares += take;
            if cumulative_shares >= shares {
                break;
            }
        }
        if cumulative_shares == Decimal::ZERO {
            return None;
        }
        Some((cumulative_cost / cumulative_shares, cumulative_shares))
    }

    /// Walk bids to find the volume-weighted fill price for a SELL of
    /// `shares` units. Returns `(avg_price, filled_shares)`.
    pub fn calculate_sell_market_price(&self, shares: Decimal) -> Option<(Decimal, Decimal)> {
        let mut cumulative_shares = Decimal::ZERO;
        let mut cumulative_proceeds = Decimal::ZERO;
        for (&price, &size) in self.bids.iter().rev() {
            if price <= Decimal::ZERO || size <= Decimal::ZERO {
                continue;
            }
            let take = size.min(shares - cumulative_shares);
            cumulative_proceeds += price * take;
            cumulative_shares += take;
            if cumulative_shares >= shares {
                break;
            }
        }
        if cumulative_shares == Decimal::ZERO {
            return None;
        }
        Some((cumulative_proceeds / cumulative_shares, cumulative_shares))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book() -> OrderBook {
        let mut b = OrderBook::new("tok".into());
        b.asks.insert(dec!(0.10), dec!(50));
        b.asks.insert(dec!(0.11), dec!(50));
        b.bids.insert(dec!(0.09), dec!(50));
        b.bids.insert(dec!(0.08), dec!(50));
        b
    }

    #[test]
    fn walks_depth_for_large_buy() {
        let b = book();
        let (price, filled) = b.calculate_buy_market_price(dec!(80)).unwrap();
        assert_eq!(filled, dec!(80));
        assert_eq!(price, dec!(8.30) / dec!(80));
    }

    #[test]
    fn buy_fits_in_top_level() {
        let b = book();
        let (price, filled) = b.calculate_buy_market_price(dec!(20)).unwrap();
        assert_eq!(filled, dec!(20));
        assert_eq!(price, dec!(0.10));
    }

    #[test]
    fn sell_walks_bids_best_first() {
        let b = book();
        let (price, filled) = b.calculate_sell_market_price(dec!(80)).unwrap();
        assert_eq!(filled, dec!(80));
        assert_eq!(price, dec!(7.30) / dec!(80));
    }

    #[test]
    fn empty_book_returns_none() {
        let b = OrderBook::new("tok".into());
        assert!(b.calculate_buy_market_price(dec!(10)).is_none());
        assert!(b.calculate_sell_market_price(dec!(10)).is_none());
    }
}
