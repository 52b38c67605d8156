use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::api::PaperBroker;
use crate::models::{round_price, Candle, Granularity, Ohlc, Price};
use crate::{BotError, Result};

/// Units available at every synthetic quote
const AVAILABLE_UNITS: i64 = 10_000_000;

/// Bar under construction for one granularity
#[derive(Debug, Clone)]
struct FormingBar {
    open_time: DateTime<Utc>,
    ohlc: Ohlc,
    ticks: i64,
}

impl FormingBar {
    fn start(open_time: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            open_time,
            ohlc: Ohlc::flat(price),
            ticks: 1,
        }
    }

    fn push(&mut self, price: Decimal) {
        self.ohlc.high = self.ohlc.high.max(price);
        self.ohlc.low = self.ohlc.low.min(price);
        self.ohlc.close = price;
        self.ticks += 1;
    }

    fn candle(&self, granularity: Granularity, complete: bool) -> Result<Candle> {
        Candle::new(
            self.open_time,
            self.ohlc,
            self.ticks,
            granularity.seconds(),
            complete,
        )
    }
}

/// Open time of the bar containing `time`
fn bar_open(time: DateTime<Utc>, granularity: Granularity) -> Result<DateTime<Utc>> {
    let seconds = granularity.seconds();
    let aligned = time.timestamp().div_euclid(seconds) * seconds;
    Utc.timestamp_opt(aligned, 0)
        .single()
        .ok_or_else(|| BotError::InvalidArgument(format!("cannot align {} to {}", time, granularity)))
}

/// Seeded random-walk market feeding a paper broker
///
/// Moves the mid price by a random number of points each step, keeps one
/// forming bar per granularity and publishes it as complete once the clock
/// crosses its boundary. The same seed always produces the same market.
pub struct SyntheticMarket {
    rng: StdRng,
    clock: DateTime<Utc>,
    mid: Decimal,
    spread: Decimal,
    /// Largest move per step, in points of the 5th decimal
    max_step_points: i64,
    bars: BTreeMap<Granularity, FormingBar>,
}

impl SyntheticMarket {
    pub fn new(
        seed: u64,
        start: DateTime<Utc>,
        start_price: Decimal,
        spread: Decimal,
        granularities: &[Granularity],
    ) -> Result<Self> {
        if start_price <= Decimal::ZERO {
            return Err(BotError::InvalidArgument(format!(
                "start price must be positive, got {}",
                start_price
            )));
        }

        let mid = round_price(start_price);
        let bars = granularities
            .iter()
            .map(|g| Ok((*g, FormingBar::start(bar_open(start, *g)?, mid))))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            clock: start,
            mid,
            spread: round_price(spread),
            max_step_points: 8,
            bars,
        })
    }

    pub fn with_max_step_points(mut self, points: i64) -> Self {
        self.max_step_points = points.max(0);
        self
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn mid(&self) -> Decimal {
        self.mid
    }

    fn random_step(&mut self) -> Decimal {
        let points = self
            .rng
            .gen_range(-self.max_step_points..=self.max_step_points);
        Decimal::new(points, 5)
    }

    fn quote(&self) -> Result<Price> {
        Price::new(
            self.clock,
            round_price(self.mid + self.spread),
            self.mid,
            true,
            AVAILABLE_UNITS,
        )
    }

    /// Publish `count` completed bars per granularity ending where the
    /// market currently stands, plus the forming bars and a first quote
    pub fn seed_history(&mut self, broker: &PaperBroker, count: usize) -> Result<()> {
        let granularities: Vec<Granularity> = self.bars.keys().copied().collect();
        for granularity in granularities {
            let forming_open = self.bars[&granularity].open_time;

            // walk backwards from the current price so every history meets it
            let mut close = self.mid;
            let mut history = Vec::with_capacity(count);
            for i in 1..=count {
                let open = (close - self.random_step() * Decimal::from(3)).max(Decimal::new(1, 5));
                let high = open.max(close) + self.random_step().abs();
                let low = (open.min(close) - self.random_step().abs()).max(Decimal::new(1, 5));
                let time = forming_open - granularity.duration() * i as i32;
                history.push(Candle::completed(
                    time,
                    Ohlc::new(open, high, low, close),
                    100,
                    granularity,
                )?);
                close = open;
            }

            for candle in history.into_iter().rev() {
                broker.publish_candle(granularity, candle)?;
            }
            broker.publish_candle(granularity, self.bars[&granularity].candle(granularity, false)?)?;
        }

        broker.publish_price(self.quote()?)?;
        tracing::info!(
            bars = count,
            clock = %self.clock,
            mid = %self.mid,
            "Synthetic history seeded"
        );
        Ok(())
    }

    /// Advance the clock, move the price and publish what changed
    pub fn step(&mut self, broker: &PaperBroker, seconds: i64) -> Result<Price> {
        self.clock += Duration::seconds(seconds.max(1));
        let moved = self.mid + self.random_step();
        self.mid = round_price(moved.max(Decimal::new(1, 5)));

        for (granularity, bar) in self.bars.iter_mut() {
            let open = bar_open(self.clock, *granularity)?;
            if open > bar.open_time {
                broker.publish_candle(*granularity, bar.candle(*granularity, true)?)?;

                // a step longer than the bar leaves empty bars behind
                let mut gap = bar.open_time + granularity.duration();
                while gap < open {
                    let filler = Candle::completed(gap, Ohlc::flat(bar.ohlc.close), 0, *granularity)?;
                    broker.publish_candle(*granularity, filler)?;
                    gap += granularity.duration();
                }
                *bar = FormingBar::start(open, self.mid);
            } else {
                bar.push(self.mid);
            }
            broker.publish_candle(*granularity, bar.candle(*granularity, false)?)?;
        }

        let price = self.quote()?;
        broker.publish_price(price.clone())?;
        Ok(price)
    }

    /// Set the mid price directly, for scripted scenarios
    pub fn jump_to(&mut self, mid: Decimal) {
        self.mid = round_price(mid);
    }
}
