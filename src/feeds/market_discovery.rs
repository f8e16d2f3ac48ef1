use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::models::market::{Asset, Market};

/// 15-minute markets only, per §2/§4.1 — this core never discovers any
/// other duration, unlike the teacher's multi-duration discovery.
const INTERVAL_SECONDS: i64 = 15 * 60;

/// Finds currently active 15-minute markets for a configured asset set.
/// Slug scheme (`{asset}-updown-15m-{unix_interval_start}`) is the venue's
/// own naming convention, grounded on `feeds::polymarket`'s slug format.
pub struct MarketDiscovery {
    http: reqwest::Client,
    gamma_host: String,
}

impl MarketDiscovery {
    pub fn new(gamma_host: String, timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build discovery HTTP client");
        Self { http, gamma_host }
    }

    pub fn current_slug(asset: Asset, now: DateTime<Utc>) -> String {
        let ts = now.timestamp();
        let interval_start = (ts / INTERVAL_SECONDS) * INTERVAL_SECONDS;
        format!("{}-updown-15m-{}", asset.slug_prefix(), interval_start)
    }

    fn deadline_for(now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = now.timestamp();
        let interval_start = (ts / INTERVAL_SECONDS) * INTERVAL_SECONDS;
        Utc.timestamp_opt(interval_start + INTERVAL_SECONDS, 0)
            .single()
            .unwrap_or(now)
    }

    /// Queries the venue for every configured asset's current 15-minute
    /// market. Rejects markets whose advertised deadline has already
    /// passed or whose token ids are missing — a `None` for an asset means
    /// the slot should be retried on the next discovery pass.
    pub async fn discover(&self, assets: &[Asset], now: DateTime<Utc>) -> Vec<Market> {
        let mut markets = Vec::with_capacity(assets.len());
        for &asset in assets {
            let slug = Self::current_slug(asset, now);
            match self.resolve_market(&slug, asset, now).await {
                Ok(Some(market)) if !market.is_stale(now) && market.has_tokens() => {
                    markets.push(market);
                }
                Ok(Some(_)) => {
                    tracing::debug!(slug, "discovered market rejected: stale or missing tokens");
                }
                Ok(None) => tracing::debug!(slug, "market not yet resolvable"),
                Err(e) => tracing::warn!(slug, error = %e, "market discovery request failed"),
            }
        }
        markets
    }

    async fn resolve_market(
        &self,
        slug: &str,
        asset: Asset,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Market>> {
        let url = format!("{}/markets?slug={}", self.gamma_host, slug);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }

        let text = resp.text().await?;
        let infos: Vec<MarketInfo> = serde_json::from_str(&text).unwrap_or_default();
        let info = match infos.into_iter().next() {
            Some(i) => i,
            None => return Ok(None),
        };

        let tokens = info.tokens.unwrap_or_default();
        let yes_token = tokens
            .iter()
            .find(|t| matches!(t.outcome.as_deref(), Some("Yes") | Some("Up")))
            .and_then(|t| t.token_id.clone());
        let no_token = tokens
            .iter()
            .find(|t| matches!(t.outcome.as_deref(), Some("No") | Some("Down")))
            .and_then(|t| t.token_id.clone());

        let (yes_id, no_id) = match (yes_token, no_token) {
            (Some(y), Some(n)) => (Some(y), Some(n)),
            _ => {
                let clob_ids: Vec<String> = info
                    .clob_token_ids
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or_default();
                let outcomes: Vec<String> = info
                    .outcomes
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or_default();

                let up_idx = outcomes.iter().position(|o| o == "Up" || o == "Yes");
                let down_idx = outcomes.iter().position(|o| o == "Down" || o == "No");
                match (up_idx, down_idx) {
                    (Some(u), Some(d)) if clob_ids.len() > u.max(d) => {
                        (Some(clob_ids[u].clone()), Some(clob_ids[d].clone()))
                    }
                    _ => (None, None),
                }
            }
        };

        let condition_id = info
            .condition_id
            .unwrap_or_else(|| slug.to_string());
        let mut market = Market::new(condition_id, asset, Self::deadline_for(now));
        market.yes_token_id = yes_id;
        market.no_token_id = no_id;

        Ok(Some(market))
    }
}

#[derive(Debug, Deserialize)]
struct MarketInfo {
    #[serde(rename = "conditionId", default)]
    condition_id: Option<String>,
    #[serde(default)]
    tokens: Option<Vec<TokenInfo>>,
    #[serde(rename = "clobTokenIds", default)]
    clob_token_ids: Option<String>,
    #[serde(default)]
    outcomes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    token_id: Option<String>,
    outcome: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_slug_aligns_to_15_minute_boundary() {
        let now = Utc.timestamp_opt(1_770_933_900, 0).single().unwrap();
        let slug = MarketDiscovery::current_slug(Asset::BTC, now);
        assert_eq!(slug, "btc-updown-15m-1770933600");
    }

    #[test]
    fn deadline_is_end_of_current_interval() {
        let now = Utc.timestamp_opt(1_770_933_900, 0).single().unwrap();
        let deadline = MarketDiscovery::deadline_for(now);
        assert_eq!(deadline.timestamp(), 1_770_934_500);
    }
}
