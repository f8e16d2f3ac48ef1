use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use crate::models::market::{Market, OrderBook};
use crate::models::price_update::PriceUpdate;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("venue http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Polls top-of-book for every tracked market and emits `PriceUpdate`s, per
/// §4.2. Book snapshots are cached in `books` so `PaperExecutor` can walk
/// the same depth the feed just observed.
pub struct QuoteFeed {
    http: reqwest::Client,
    clob_host: String,
    books: Arc<RwLock<HashMap<String, OrderBook>>>,
}

impl QuoteFeed {
    pub fn new(
        clob_host: String,
        timeout: std::time::Duration,
        books: Arc<RwLock<HashMap<String, OrderBook>>>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build quote feed HTTP client");
        Self {
            http,
            clob_host,
            books,
        }
    }

    pub fn books_handle(&self) -> Arc<RwLock<HashMap<String, OrderBook>>> {
        self.books.clone()
    }

    /// One tick: for each tracked market, fetch both sides' books, derive a
    /// mid price, update the market in place, and emit a `PriceUpdate` —
    /// unless `now >= resolution_deadline`, in which case the market is
    /// dropped from `tracked` instead (step 3 of §4.2).
    pub async fn tick(
        &self,
        tracked: &mut Vec<Market>,
        now: DateTime<Utc>,
        updates_tx: &mpsc::Sender<PriceUpdate>,
    ) {
        tracked.retain(|m| !m.is_stale(now));

        for market in tracked.iter_mut() {
            let (Some(yes_token), Some(no_token)) =
                (market.yes_token_id.clone(), market.no_token_id.clone())
            else {
                continue;
            };

            let yes_book = match self.fetch_book(&yes_token).await {
                Ok(book) => book,
                Err(e) => {
                    tracing::warn!(token = %yes_token, error = %e, "book fetch failed, keeping last quote");
                    continue;
                }
            };
            let no_book = match self.fetch_book(&no_token).await {
                Ok(book) => book,
                Err(e) => {
                    tracing::warn!(token = %no_token, error = %e, "book fetch failed, keeping last quote");
                    continue;
                }
            };

            if let Some(mid) = yes_book.midpoint() {
                market.yes_price = mid;
            }
            if let Some(mid) = no_book.midpoint() {
                market.no_price = mid;
            }
            market.yes_bid = yes_book.best_bid().map(|(p, _)| p);
            market.yes_ask = yes_book.best_ask().map(|(p, _)| p);
            market.no_bid = no_book.best_bid().map(|(p, _)| p);
            market.no_ask = no_book.best_ask().map(|(p, _)| p);

            self.books.write().await.insert(yes_token.clone(), yes_book);
            self.books.write().await.insert(no_token.clone(), no_book);

            let update = PriceUpdate {
                condition_id: market.condition_id.clone(),
                asset: market.asset,
                yes_price: market.yes_price,
                no_price: market.no_price,
                yes_bid: market.yes_bid,
                yes_ask: market.yes_ask,
                no_bid: market.no_bid,
                no_ask: market.no_ask,
                time_remaining_secs: market.time_remaining_secs(now),
                observed_at: now,
            };

            // Never emit an out-of-range quote — skip silently and keep the
            // market's last good price in place for the next tick.
            if !update.is_valid() {
                tracing::warn!(condition_id = %market.condition_id, "skipping invalid price update");
                continue;
            }

            if updates_tx.send(update).await.is_err() {
                tracing::warn!("price update channel closed, stopping feed tick early");
                return;
            }
        }
    }

    async fn fetch_book(&self, token_id: &str) -> Result<OrderBook, FeedError> {
        let url = format!("{}/book?token_id={}", self.clob_host, token_id);
        let resp: BookResponse = self.http.get(&url).send().await?.json().await?;

        let mut book = OrderBook::new(token_id.to_string());
        for level in &resp.bids {
            let price = level.price.parse::<Decimal>().unwrap_or_default();
            let size = level.size.parse::<Decimal>().unwrap_or_default();
            if price > Decimal::ZERO {
                book.bids.insert(price, size);
            }
        }
        for level in &resp.asks {
            let price = level.price.parse::<Decimal>().unwrap_or_default();
            let size = level.size.parse::<Decimal>().unwrap_or_default();
            if price > Decimal::ZERO {
                book.asks.insert(price, size);
            }
        }
        Ok(book)
    }
}

#[derive(Debug, Deserialize)]
struct BookResponse {
    #[serde(default)]
    bids: Vec<BookLevel>,
    #[serde(default)]
    asks: Vec<BookLevel>,
}

#[derive(Debug, Deserialize)]
struct BookLevel {
    price: String,
    size: String,
}
