use rust_decimal::Decimal;

use super::{check_history, Indicator, IndicatorSettings, Series};
use crate::models::{round_price, Candle};
use crate::Result;

/// Relative Strength Index (RSI), Wilder's smoothing
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// - First averages: plain mean of the first `period` gains and losses
/// - Then: avg = (avg * (period - 1) + change) / period
/// - RSI = 100 - 100 / (1 + avg_gain / avg_loss)
///
/// A flat market (no gains, no losses) reads 50, a market with only gains
/// reads 100.
#[derive(Debug, Clone)]
pub struct RelativeStrengthIndex {
    settings: IndicatorSettings,
    series: Series,
    previous_price: Option<Decimal>,
    changes_seen: usize,
    avg_gain: Decimal,
    avg_loss: Decimal,
}

impl RelativeStrengthIndex {
    pub fn new(settings: IndicatorSettings, candles: &[Candle]) -> Result<Self> {
        settings.validate()?;
        // `period` changes need `period + 1` prices
        check_history(candles, settings.period, settings.period + 1)?;

        let mut rsi = Self {
            settings,
            series: Series::default(),
            previous_price: None,
            changes_seen: 0,
            avg_gain: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
        };
        rsi.update(candles)?;
        Ok(rsi)
    }

    pub fn average_gain(&self) -> Decimal {
        self.avg_gain
    }

    pub fn average_loss(&self) -> Decimal {
        self.avg_loss
    }

    fn step(&mut self, price: Decimal) {
        let Some(previous) = self.previous_price.replace(price) else {
            return;
        };

        let change = price - previous;
        let (gain, loss) = if change > Decimal::ZERO {
            (change, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -change)
        };

        let period = Decimal::from(self.settings.period as u64);
        self.changes_seen += 1;

        if self.changes_seen < self.settings.period {
            // still summing the first window
            self.avg_gain += gain;
            self.avg_loss += loss;
            return;
        }

        if self.changes_seen == self.settings.period {
            self.avg_gain = round_price((self.avg_gain + gain) / period);
            self.avg_loss = round_price((self.avg_loss + loss) / period);
        } else {
            let carried = period - Decimal::ONE;
            self.avg_gain = round_price((self.avg_gain * carried + gain) / period);
            self.avg_loss = round_price((self.avg_loss * carried + loss) / period);
        }

        self.series.push(rsi_value(self.avg_gain, self.avg_loss));
    }
}

fn rsi_value(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    match (avg_gain.is_zero(), avg_loss.is_zero()) {
        (true, true) => round_price(Decimal::from(50)),
        (false, true) => round_price(Decimal::ONE_HUNDRED),
        _ => {
            let rs = avg_gain / avg_loss;
            round_price(Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + rs))
        }
    }
}

impl Indicator for RelativeStrengthIndex {
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
