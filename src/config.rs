use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::strategy::Direction;

/// Run mode. `Paper` drives the built-in simulated fill model; `Live`
/// signs and submits real orders through the venue's CLOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Paper,
    Live,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Paper
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub tier: String,
    pub entry_threshold: Decimal,
    pub exit_threshold: Decimal,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub poll_interval_secs: u64,
    pub assets: Vec<String>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            assets: vec!["BTC".into(), "ETH".into(), "SOL".into(), "XRP".into()],
        }
    }
}

/// Exit rule thresholds. `time_stop_threshold` is carried over from
/// `original_source/src/core/config.py`'s `ExitConfig` but unused by the
/// hardened core's state machine — the core's only timed exit is
/// `RESOLUTION_EXIT` at `resolution_exit_threshold`; see `engine::DecisionEngine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    pub resolution_exit_threshold_secs: f64,
    pub entry_cutoff_secs: f64,
    pub cooldown_minutes: i64,
    #[serde(default)]
    pub time_stop_threshold_secs: Option<f64>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            resolution_exit_threshold_secs: 120.0,
            entry_cutoff_secs: 180.0,
            cooldown_minutes: 15,
            time_stop_threshold_secs: Some(600.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollConfig {
    pub initial: Decimal,
    pub kelly_fraction: Decimal,
    pub max_bet_pct: Decimal,
    pub min_bet_pct: Decimal,
    pub spend_cap: Decimal,
    pub spend_window_minutes: i64,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            initial: Decimal::new(5, 0),
            kelly_fraction: Decimal::new(50, 2),
            max_bet_pct: Decimal::new(15, 2),
            min_bet_pct: Decimal::new(3, 2),
            spend_cap: Decimal::new(5, 0),
            spend_window_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub clob_host: String,
    pub gamma_api_host: String,
    pub chain_id: u64,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub funder_address: Option<String>,
    pub signature_type: u8,
    pub http_timeout_secs: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            clob_host: "https://clob.polymarket.com".into(),
            gamma_api_host: "https://gamma-api.polymarket.com".into(),
            chain_id: 137,
            private_key: String::new(),
            funder_address: None,
            signature_type: 0,
            http_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            discord_webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub collection: CollectionConfig,
    pub strategies: Vec<StrategyConfig>,
    #[serde(default)]
    pub bankroll: BankrollConfig,
    #[serde(default)]
    pub exits: ExitConfig,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_database_path() -> String {
    "data/tickwindow.db".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            database_path: default_database_path(),
            collection: CollectionConfig::default(),
            strategies: Vec::new(),
            bankroll: BankrollConfig::default(),
            exits: ExitConfig::default(),
            venue: VenueConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Reads the YAML file at `path`, then applies the documented
    /// environment overrides, then validates. Grounded on
    /// `examples/original_source/src/core/config.py`'s `load_config` — same
    /// override set (`MODE`, `DATABASE_PATH`, venue credentials), same
    /// YAML-first-then-env-then-validate order.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();

        let mut config: Config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&raw)?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        };

        if let Ok(mode) = std::env::var("MODE") {
            config.mode = match mode.to_ascii_lowercase().as_str() {
                "live" => Mode::Live,
                _ => Mode::Paper,
            };
        }
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = path;
        }
        if let Ok(key) = std::env::var("POLY_PRIVATE_KEY") {
            if !key.is_empty() {
                config.venue.private_key = key;
            }
        }
        if let Ok(addr) = std::env::var("POLY_FUNDER_ADDRESS") {
            if !addr.is_empty() {
                config.venue.funder_address = Some(addr);
            }
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.is_empty() {
                config.telemetry.discord_webhook_url = Some(url);
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn is_live(&self) -> bool {
        self.mode == Mode::Live
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.strategies.is_empty(),
            "at least one strategy must be configured"
        );
        for s in &self.strategies {
            match s.direction {
                Direction::Normal => anyhow::ensure!(
                    s.exit_threshold > s.entry_threshold,
                    "strategy '{}': normal direction requires exit_threshold > entry_threshold",
                    s.id
                ),
                Direction::Fade => anyhow::ensure!(
                    s.exit_threshold < s.entry_threshold,
                    "strategy '{}': fade direction requires exit_threshold < entry_threshold",
                    s.id
                ),
            }
        }
        anyhow::ensure!(
            self.bankroll.min_bet_pct <= self.bankroll.max_bet_pct,
            "bankroll.min_bet_pct must be <= bankroll.max_bet_pct"
        );
        if self.is_live() {
            anyhow::ensure!(
                !self.venue.private_key.is_empty(),
                "POLY_PRIVATE_KEY must be set when mode = live"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn strategy(id: &str, entry: Decimal, exit: Decimal, direction: Direction) -> StrategyConfig {
        StrategyConfig {
            id: id.into(),
            tier: "tier1".into(),
            entry_threshold: entry,
            exit_threshold: exit,
            direction,
        }
    }

    #[test]
    fn default_is_paper_mode() {
        assert_eq!(Config::default().mode, Mode::Paper);
    }

    #[test]
    fn validate_rejects_empty_strategy_set() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_normal_thresholds() {
        let mut config = Config::default();
        config.strategies = vec![strategy("bad", dec!(0.20), dec!(0.10), Direction::Normal)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_fade_strategy() {
        let mut config = Config::default();
        config.strategies = vec![strategy("fade_85_75", dec!(0.85), dec!(0.75), Direction::Fade)];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_requires_private_key_in_live_mode() {
        let mut config = Config::default();
        config.mode = Mode::Live;
        config.strategies = vec![strategy("deep_10_20", dec!(0.10), dec!(0.20), Direction::Normal)];
        assert!(config.validate().is_err());
    }
}
