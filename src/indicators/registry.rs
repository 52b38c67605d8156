use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{
    ExponentialMovingAverage, Indicator, IndicatorSettings, RelativeStrengthIndex,
    SimpleMovingAverage, WeightedMovingAverage,
};
use crate::models::Candle;
use crate::{BotError, Result};

type Constructor = fn(IndicatorSettings, &[Candle]) -> Result<Box<dyn Indicator>>;

/// Indicator kinds the engine knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IndicatorKind {
    Sma,
    Wma,
    Ema,
    Rsi,
}

const NAMES: &[(&str, IndicatorKind)] = &[
    ("SMA", IndicatorKind::Sma),
    ("WMA", IndicatorKind::Wma),
    ("EMA", IndicatorKind::Ema),
    ("RSI", IndicatorKind::Rsi),
];

fn build_sma(settings: IndicatorSettings, candles: &[Candle]) -> Result<Box<dyn Indicator>> {
    Ok(Box::new(SimpleMovingAverage::new(settings, candles)?))
}

fn build_wma(settings: IndicatorSettings, candles: &[Candle]) -> Result<Box<dyn Indicator>> {
    Ok(Box::new(WeightedMovingAverage::new(settings, candles)?))
}

fn build_ema(settings: IndicatorSettings, candles: &[Candle]) -> Result<Box<dyn Indicator>> {
    Ok(Box::new(ExponentialMovingAverage::new(settings, candles)?))
}

fn build_rsi(settings: IndicatorSettings, candles: &[Candle]) -> Result<Box<dyn Indicator>> {
    Ok(Box::new(RelativeStrengthIndex::new(settings, candles)?))
}

impl IndicatorKind {
    pub fn name(self) -> &'static str {
        match self {
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Wma => "WMA",
            IndicatorKind::Ema => "EMA",
            IndicatorKind::Rsi => "RSI",
        }
    }

    fn constructor(self) -> Constructor {
        match self {
            IndicatorKind::Sma => build_sma,
            IndicatorKind::Wma => build_wma,
            IndicatorKind::Ema => build_ema,
            IndicatorKind::Rsi => build_rsi,
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndicatorKind {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| BotError::unknown("indicator", s))
    }
}

impl TryFrom<String> for IndicatorKind {
    type Error = BotError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IndicatorKind> for String {
    fn from(value: IndicatorKind) -> Self {
        value.name().to_string()
    }
}

/// Build and bootstrap the indicator described by `settings`
pub fn build_indicator(
    settings: IndicatorSettings,
    candles: &[Candle],
) -> Result<Box<dyn Indicator>> {
    let kind = settings.kind;
    let indicator = (kind.constructor())(settings, candles)?;

    tracing::debug!(
        kind = %kind,
        role = %indicator.settings().role,
        period = indicator.settings().period,
        values = indicator.values().len(),
        "Indicator bootstrapped"
    );

    Ok(indicator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{closes, settings};

    #[test]
    fn test_parse_known_kinds() {
        assert_eq!("sma".parse::<IndicatorKind>().unwrap(), IndicatorKind::Sma);
        assert_eq!(" EMA".parse::<IndicatorKind>().unwrap(), IndicatorKind::Ema);
        assert_eq!(IndicatorKind::Rsi.to_string(), "RSI");
    }

    #[test]
    fn test_unknown_kind() {
        let err = "MACD".parse::<IndicatorKind>().unwrap_err();
        assert!(matches!(err, BotError::UnknownSelector { kind: "indicator", .. }));
    }

    #[test]
    fn test_build_each_kind() {
        let candles = closes(&["1.1", "1.2", "1.3", "1.2", "1.4"]);
        for kind in [
            IndicatorKind::Sma,
            IndicatorKind::Wma,
            IndicatorKind::Ema,
            IndicatorKind::Rsi,
        ] {
            let indicator = build_indicator(settings(kind, 3), &candles).unwrap();
            assert_eq!(indicator.settings().kind, kind);
            assert!(!indicator.values().is_empty());
        }
    }

    #[test]
    fn test_build_rejects_bad_period() {
        let candles = closes(&["1.1", "1.2"]);
        assert!(matches!(
            build_indicator(settings(IndicatorKind::Sma, 0), &candles),
            Err(BotError::OutOfRange { .. })
        ));
    }
}
