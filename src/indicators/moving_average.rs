use std::collections::VecDeque;

use rust_decimal::Decimal;

use super::{check_history, Indicator, IndicatorSettings, Series};
use crate::models::{round_price, Candle};
use crate::Result;

/// Fixed-size rolling window of prices
#[derive(Debug, Clone)]
struct Window {
    prices: VecDeque<Decimal>,
    period: usize,
}

impl Window {
    fn new(period: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(period + 1),
            period,
        }
    }

    /// Push a price, returning the one that fell out of the window
    fn push(&mut self, price: Decimal) -> Option<Decimal> {
        self.prices.push_back(price);
        if self.prices.len() > self.period {
            self.prices.pop_front()
        } else {
            None
        }
    }

    fn is_full(&self) -> bool {
        self.prices.len() == self.period
    }
}

/// Simple Moving Average (SMA)
///
/// Keeps a running sum so each new bar costs O(1).
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    settings: IndicatorSettings,
    series: Series,
    window: Window,
    sum: Decimal,
}

impl SimpleMovingAverage {
    pub fn new(settings: IndicatorSettings, candles: &[Candle]) -> Result<Self> {
        settings.validate()?;
        check_history(candles, settings.period, settings.period)?;

        let mut sma = Self {
            window: Window::new(settings.period),
            settings,
            series: Series::default(),
            sum: Decimal::ZERO,
        };
        sma.update(candles)?;
        Ok(sma)
    }

    fn step(&mut self, price: Decimal) {
        self.sum += price;
        if let Some(dropped) = self.window.push(price) {
            self.sum -= dropped;
        }
        if self.window.is_full() {
            let average = round_price(self.sum / Decimal::from(self.settings.period));
            self.series.push(average);
        }
    }
}

impl Indicator for SimpleMovingAverage {
    fn settings(&self) -> &IndicatorSettings {
        &self.settings
    }

    fn values(&self) -> &[Decimal] {
        self.series.values()
    }

    fn update(&mut self, candles: &[Candle]) -> Result<usize> {
        let before = self.series.values().len();
        let price_type = self.settings.price_type;
        for candle in self.series.take_fresh(candles) {
            self.step(candle.price(price_type));
        }
        Ok(self.series.values().len() - before)
    }
}

/// Weighted Moving Average (WMA)
///
/// Linear weights 1..=period, the most recent bar carrying the largest.
#[derive(Debug, Clone)]
pub struct WeightedMovingAverage {
    settings: IndicatorSettings,
    series: Series,
    window: Window,
    denominator: Decimal,
}

impl WeightedMovingAverage {
    pub fn new(settings: IndicatorSettings, candles: &[Candle]) -> Result<Self> {
        settings.validate()?;
        check_history(candles, settings.period, settings.period)?;

        let period = settings.period as u64;
        let mut wma = Self {
            window: Window::new(settings.period),
            denominator: Decimal::from(period * (period + 1) / 2),
            settings,
            series: Series::default(),
        };
        wma.update(candles)?;
        Ok(wma)
    }

    fn step(&mut self, price: Decimal) {
        self.window.push(price);
        if !self.window.is_full() {
            return;
        }
        let numerator: Decimal = self
            .window
            .prices
            .iter()
            .enumerate()
            .map(|(i, p)| *p * Decimal::from(i as u64 + 1))
            .sum();
        self.series
            .push(round_price(numerator / self.denominator));
    }
}

impl Indicator for WeightedMovingAverage {
    fn settings(&self) -> &IndicatorSettings {
        &self.settings
    }

    fn values(&self) -> &[Decimal] {
        self.series.values()
    }

    fn update(&mut self, candles: &[Candle]) -> Result<usize> {
        let before = self.series.values().len();
        let price_type = self.settings.price_type;
        for candle in self.series.take_fresh(candles) {
            self.step(candle.price(price_type));
        }
        Ok(self.series.values().len() - before)
    }
}

/// Exponential Moving Average (EMA)
///
/// Seeded with the SMA of the first `period` prices.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    settings: IndicatorSettings,
    series: Series,
    multiplier: Decimal,
    warmup: Vec<Decimal>,
    previous: Option<Decimal>,
}

impl ExponentialMovingAverage {
    pub fn new(settings: IndicatorSettings, candles: &[Candle]) -> Result<Self> {
        settings.validate()?;
        check_history(candles, settings.period, settings.period)?;

        let mut ema = Self {
            multiplier: Decimal::TWO / Decimal::from(settings.period as u64 + 1),
            warmup: Vec::with_capacity(settings.period),
            settings,
            series: Series::default(),
            previous: None,
        };
        ema.update(candles)?;
        Ok(ema)
    }

    fn step(&mut self, price: Decimal) {
        let next = match self.previous {
            Some(previous) => round_price((price - previous) * self.multiplier + previous),
            None => {
                self.warmup.push(price);
                if self.warmup.len() < self.settings.period {
                    return;
                }
                let sum: Decimal = self.warmup.drain(..).sum();
                round_price(sum / Decimal::from(self.settings.period))
            }
        };
        self.previous = Some(next);
        self.series.push(next);
    }
}

impl Indicator for ExponentialMovingAverage {
    fn settings(&self) -> &IndicatorSettings {
        &self.settings
    }

    fn values(&self) -> &[Decimal] {
        self.series.values()
    }

    fn update(&mut self, candles: &[Candle]) -> Result<usize> {
        let before = self.series.values().len();
        let price_type = self.settings.price_type;
        for candle in self.series.take_fresh(candles) {
            self.step(candle.price(price_type));
        }
        Ok(self.series.values().len() - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{candle_at, closes, settings};
    use crate::indicators::IndicatorKind;
    use crate::BotError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sma() {
        let candles = closes(&["100", "102", "104", "106", "108"]);
        let sma = SimpleMovingAverage::new(settings(IndicatorKind::Sma, 5), &candles).unwrap();
        assert_eq!(sma.values(), &[dec!(104)]);
    }

    #[test]
    fn test_sma_rolls_window() {
        let candles = closes(&["1.1", "1.2", "1.3", "1.4"]);
        let sma = SimpleMovingAverage::new(settings(IndicatorKind::Sma, 3), &candles).unwrap();
        assert_eq!(sma.values(), &[dec!(1.2), dec!(1.3)]);
    }

    #[test]
    fn test_sma_rounds_half_up() {
        // (1.00001 + 1.00002) / 2 = 1.000015
        let candles = closes(&["1.00001", "1.00002"]);
        let sma = SimpleMovingAverage::new(settings(IndicatorKind::Sma, 2), &candles).unwrap();
        assert_eq!(sma.last(), Some(dec!(1.00002)));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let candles = closes(&["100", "102"]);
        let result = SimpleMovingAverage::new(settings(IndicatorKind::Sma, 5), &candles);
        assert!(matches!(
            result,
            Err(BotError::InsufficientHistory { available: 2, .. })
        ));
    }

    #[test]
    fn test_sma_empty_history() {
        let result = SimpleMovingAverage::new(settings(IndicatorKind::Sma, 5), &[]);
        assert!(matches!(result, Err(BotError::InvalidArgument(_))));
    }

    #[test]
    fn test_sma_incremental_matches_bootstrap() {
        let all = closes(&["1.1", "1.3", "1.2", "1.5", "1.4", "1.6", "1.7"]);
        let full = SimpleMovingAverage::new(settings(IndicatorKind::Sma, 3), &all).unwrap();

        let mut incremental =
            SimpleMovingAverage::new(settings(IndicatorKind::Sma, 3), &all[..4]).unwrap();
        assert_eq!(incremental.update(&all[..6]).unwrap(), 2);
        assert_eq!(incremental.update(&all).unwrap(), 1);

        assert_eq!(incremental.values(), full.values());
    }

    #[test]
    fn test_update_with_same_candles_is_noop() {
        let candles = closes(&["1.1", "1.2", "1.3"]);
        let mut sma = SimpleMovingAverage::new(settings(IndicatorKind::Sma, 2), &candles).unwrap();
        assert_eq!(sma.update(&candles).unwrap(), 0);
        assert_eq!(sma.values().len(), 2);
    }

    #[test]
    fn test_wma_favours_recent_bars() {
        // (1*1 + 2*2 + 3*3) / 6 = 14 / 6 = 2.333333...
        let candles = closes(&["1", "2", "3"]);
        let wma = WeightedMovingAverage::new(settings(IndicatorKind::Wma, 3), &candles).unwrap();
        assert_eq!(wma.values(), &[dec!(2.33333)]);

        let sma = SimpleMovingAverage::new(settings(IndicatorKind::Sma, 3), &candles).unwrap();
        assert!(wma.last().unwrap() > sma.last().unwrap());
    }

    #[test]
    fn test_wma_update() {
        let candles = closes(&["1", "2", "3"]);
        let mut wma =
            WeightedMovingAverage::new(settings(IndicatorKind::Wma, 2), &candles).unwrap();
        // (1*2 + 2*3) / 3 = 2.66667
        assert_eq!(wma.last(), Some(dec!(2.66667)));

        let mut more = candles.clone();
        more.push(candle_at(3, dec!(6)));
        wma.update(&more).unwrap();
        // (1*3 + 2*6) / 3 = 5
        assert_eq!(wma.last(), Some(dec!(5)));
        assert_eq!(wma.values().len(), 3);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let candles = closes(&["100", "102", "104", "106", "108", "110"]);
        let ema =
            ExponentialMovingAverage::new(settings(IndicatorKind::Ema, 5), &candles).unwrap();

        // seed 104, then (110 - 104) * 2/6 + 104 = 106
        assert_eq!(ema.values(), &[dec!(104), dec!(106)]);
    }

    #[test]
    fn test_ema_incremental_matches_bootstrap() {
        let all = closes(&[
            "1.16114", "1.16214", "1.16314", "1.16414", "1.16514", "1.16614", "1.16714",
        ]);
        let full = ExponentialMovingAverage::new(settings(IndicatorKind::Ema, 3), &all).unwrap();

        let mut incremental =
            ExponentialMovingAverage::new(settings(IndicatorKind::Ema, 3), &all[..3]).unwrap();
        for end in 4..=all.len() {
            incremental.update(&all[..end]).unwrap();
        }

        assert_eq!(incremental.values(), full.values());
        for value in full.values() {
            assert_eq!(value.scale(), 5);
        }
    }

    #[test]
    fn test_ema_insufficient_data() {
        let candles = closes(&["1", "2"]);
        assert!(ExponentialMovingAverage::new(settings(IndicatorKind::Ema, 3), &candles).is_err());
    }
}
