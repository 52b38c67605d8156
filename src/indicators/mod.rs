// Technical indicators module
// Incremental SMA, WMA, EMA and RSI series over decimal candle prices

pub mod moving_average;
pub mod registry;
pub mod rsi;
pub mod set;

pub use moving_average::{ExponentialMovingAverage, SimpleMovingAverage, WeightedMovingAverage};
pub use registry::{build_indicator, IndicatorKind};
pub use rsi::RelativeStrengthIndex;
pub use set::{IndicatorRole, IndicatorSet, IndicatorSnapshot};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Candle, CandlePriceType, Granularity};
use crate::{BotError, Result};

pub const MIN_PERIOD: usize = 1;
pub const MAX_PERIOD: usize = 4000;

/// Identity of one configured indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    pub kind: IndicatorKind,
    pub role: IndicatorRole,
    pub period: usize,
    #[serde(default = "default_price_type")]
    pub price_type: CandlePriceType,
    #[serde(default = "default_granularity")]
    pub granularity: Granularity,
}

fn default_price_type() -> CandlePriceType {
    CandlePriceType::Close
}

fn default_granularity() -> Granularity {
    Granularity::M30
}

impl IndicatorSettings {
    pub fn new(
        kind: IndicatorKind,
        role: IndicatorRole,
        period: usize,
        price_type: CandlePriceType,
        granularity: Granularity,
    ) -> Self {
        Self {
            kind,
            role,
            period,
            price_type,
            granularity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_PERIOD..=MAX_PERIOD).contains(&self.period) {
            return Err(BotError::OutOfRange {
                name: "period",
                value: self.period as i64,
                min: MIN_PERIOD as i64,
                max: MAX_PERIOD as i64,
            });
        }
        Ok(())
    }
}

/// Stateful numeric transform over a candle history
///
/// Implementations bootstrap from the full history when constructed and then
/// append one value per candle newer than the last one they have seen.
pub trait Indicator: Send + Sync {
    fn settings(&self) -> &IndicatorSettings;

    /// Every value computed so far, oldest first
    fn values(&self) -> &[Decimal];

    /// Incorporate the candles that are newer than the last one seen.
    /// Returns how many values were appended.
    fn update(&mut self, candles: &[Candle]) -> Result<usize>;

    fn last(&self) -> Option<Decimal> {
        self.values().last().copied()
    }
}

/// Append-only value storage shared by all indicator kinds
#[derive(Debug, Clone, Default)]
pub(crate) struct Series {
    values: Vec<Decimal>,
    last_time: Option<DateTime<Utc>>,
}

impl Series {
    pub(crate) fn values(&self) -> &[Decimal] {
        &self.values
    }

    pub(crate) fn push(&mut self, value: Decimal) {
        self.values.push(value);
    }

    /// Complete candles strictly newer than the last incorporated one,
    /// marking them as seen
    pub(crate) fn take_fresh<'a>(&mut self, candles: &'a [Candle]) -> Vec<&'a Candle> {
        let last_time = self.last_time;
        let fresh: Vec<&Candle> = candles
            .iter()
            .filter(|c| c.is_complete())
            .filter(|c| last_time.map_or(true, |t| c.time() > t))
            .collect();

        if let Some(newest) = fresh.iter().map(|c| c.time()).max() {
            self.last_time = Some(newest);
        }
        fresh
    }
}

/// Fail fast on a history too short to produce a first value
pub(crate) fn check_history(candles: &[Candle], period: usize, required: usize) -> Result<()> {
    if candles.is_empty() {
        return Err(BotError::InvalidArgument(
            "candle history must not be empty".to_string(),
        ));
    }
    let available = candles.iter().filter(|c| c.is_complete()).count();
    if available < required {
        return Err(BotError::InsufficientHistory {
            available,
            period,
            required,
        });
    }
    Ok(())
}
