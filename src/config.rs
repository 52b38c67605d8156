use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::execution::{exit_strategy_names, AggregatorSettings, ExitSettings};
use crate::indicators::{IndicatorKind, IndicatorRole, IndicatorSettings};
use crate::models::{CandlePriceType, Granularity};
use crate::risk::order_strategy_names;
use crate::strategy::{entry_strategy_names, CrossoverSettings};
use crate::{BotError, Result};

/// Environment variable prefix, e.g. `FXBOT__SPREAD=0.0003`
pub const ENV_PREFIX: &str = "FXBOT";

/// Everything the engine needs to know about what and how to trade
///
/// Any field left out of the file and the environment keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub instrument: String,
    pub spread: Decimal,
    /// Fraction of the balance risked on one trade
    pub risk_per_trade: Decimal,
    pub initial_candles_quantity: usize,
    pub update_candles_quantity: usize,
    pub entry_strategy: String,
    pub order_strategy: String,
    pub exit_strategy: String,
    pub stop_loss_filter: Decimal,
    pub entry_filter: Decimal,
    pub first_target_distance: Decimal,
    pub break_even_distance: Decimal,
    /// Share of the position closed at the first target
    pub partial_close_fraction: Decimal,
    pub rsi_filter: Decimal,
    pub exit_granularity: Granularity,
    pub one_pip: Decimal,
    /// How far past its stop the price may go before a pending entry is cancelled
    pub order_cancel_offset: Decimal,
    pub poll_interval_ms: u64,
    pub candle_retry_interval_ms: u64,
    pub max_candles: usize,
    pub indicators: Vec<IndicatorSettings>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let m30 = |kind, role, period| {
            IndicatorSettings::new(kind, role, period, CandlePriceType::Close, Granularity::M30)
        };

        Self {
            instrument: "EUR_USD".to_string(),
            spread: dec!(0.00020),
            risk_per_trade: dec!(0.01),
            initial_candles_quantity: 200,
            update_candles_quantity: 3,
            entry_strategy: "crossover".to_string(),
            order_strategy: "fixed_risk".to_string(),
            exit_strategy: "half_close_trailing".to_string(),
            stop_loss_filter: dec!(0.00050),
            entry_filter: dec!(0.00100),
            first_target_distance: dec!(0.00250),
            break_even_distance: dec!(0.00200),
            partial_close_fraction: dec!(0.5),
            rsi_filter: dec!(50),
            exit_granularity: Granularity::M30,
            one_pip: dec!(0.0001),
            order_cancel_offset: dec!(0.00050),
            poll_interval_ms: 1000,
            candle_retry_interval_ms: 1000,
            max_candles: 1000,
            indicators: vec![
                m30(IndicatorKind::Ema, IndicatorRole::Fast, 5),
                m30(IndicatorKind::Ema, IndicatorRole::Middle, 10),
                m30(IndicatorKind::Ema, IndicatorRole::Slow, 20),
                m30(IndicatorKind::Sma, IndicatorRole::Price, 1),
                IndicatorSettings::new(
                    IndicatorKind::Sma,
                    IndicatorRole::Daily,
                    20,
                    CandlePriceType::Close,
                    Granularity::D,
                ),
                m30(IndicatorKind::Rsi, IndicatorRole::Rsi, 14),
            ],
        }
    }
}

impl StrategyConfig {
    /// Layer defaults, an optional TOML file and `FXBOT__*` variables,
    /// then validate the result
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instrument.trim().is_empty() {
            return Err(BotError::InvalidArgument("instrument is blank".to_string()));
        }

        let fraction = |name: &str, value: Decimal| {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(BotError::InvalidArgument(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
            Ok(())
        };
        fraction("risk_per_trade", self.risk_per_trade)?;
        fraction("partial_close_fraction", self.partial_close_fraction)?;

        for (name, value) in [
            ("spread", self.spread),
            ("stop_loss_filter", self.stop_loss_filter),
            ("entry_filter", self.entry_filter),
            ("first_target_distance", self.first_target_distance),
            ("break_even_distance", self.break_even_distance),
            ("order_cancel_offset", self.order_cancel_offset),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(BotError::NegativeValue {
                    name,
                    value: value.to_string(),
                });
            }
        }
        if self.one_pip <= Decimal::ZERO {
            return Err(BotError::InvalidArgument(format!(
                "one_pip must be positive, got {}",
                self.one_pip
            )));
        }
        if self.rsi_filter < Decimal::ZERO || self.rsi_filter > Decimal::ONE_HUNDRED {
            return Err(BotError::InvalidArgument(format!(
                "rsi_filter must be in [0, 100], got {}",
                self.rsi_filter
            )));
        }

        for (name, value) in [
            ("initial_candles_quantity", self.initial_candles_quantity),
            ("update_candles_quantity", self.update_candles_quantity),
            ("max_candles", self.max_candles),
        ] {
            if value == 0 {
                return Err(BotError::OutOfRange {
                    name,
                    value: 0,
                    min: 1,
                    max: i64::MAX,
                });
            }
        }
        if self.poll_interval_ms == 0 || self.candle_retry_interval_ms == 0 {
            return Err(BotError::InvalidArgument(
                "poll and retry intervals must be positive".to_string(),
            ));
        }

        Self::check_selector("entry strategy", &self.entry_strategy, entry_strategy_names())?;
        Self::check_selector("order strategy", &self.order_strategy, order_strategy_names())?;
        Self::check_selector("exit strategy", &self.exit_strategy, exit_strategy_names())?;

        self.validate_indicators()
    }

    fn check_selector(
        kind: &'static str,
        name: &str,
        mut known: impl Iterator<Item = &'static str>,
    ) -> Result<()> {
        let wanted = name.trim().to_ascii_lowercase();
        if known.any(|k| k == wanted) {
            Ok(())
        } else {
            Err(BotError::unknown(kind, name))
        }
    }

    fn validate_indicators(&self) -> Result<()> {
        let mut roles = HashSet::new();
        for settings in &self.indicators {
            settings.validate()?;
            if !roles.insert(settings.role) {
                return Err(BotError::InvalidArgument(format!(
                    "indicator role {} configured twice",
                    settings.role
                )));
            }
        }
        if let Some(missing) = IndicatorRole::ALL.iter().find(|r| !roles.contains(*r)) {
            return Err(BotError::InvalidArgument(format!(
                "no indicator configured for role {}",
                missing
            )));
        }
        Ok(())
    }

    pub fn crossover_settings(&self) -> CrossoverSettings {
        CrossoverSettings {
            spread: self.spread,
            entry_filter: self.entry_filter,
            stop_loss_filter: self.stop_loss_filter,
            first_target_distance: self.first_target_distance,
            rsi_filter: self.rsi_filter,
        }
    }

    pub fn exit_settings(&self) -> ExitSettings {
        ExitSettings {
            break_even_distance: self.break_even_distance,
            first_target_distance: self.first_target_distance,
            partial_close_fraction: self.partial_close_fraction,
        }
    }

    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            initial_quantity: self.initial_candles_quantity,
            update_quantity: self.update_candles_quantity,
            retry_interval: Duration::from_millis(self.candle_retry_interval_ms),
            max_candles: self.max_candles,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Every granularity the indicators or the exit strategy read, ascending
    pub fn granularities(&self) -> Vec<Granularity> {
        let mut granularities: Vec<Granularity> =
            self.indicators.iter().map(|s| s.granularity).collect();
        granularities.push(self.exit_granularity);
        granularities.sort();
        granularities.dedup();
        granularities
    }
}
