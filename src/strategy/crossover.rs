use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::geometry::LineSegment;
use super::EntryStrategy;
use crate::indicators::{IndicatorRole, IndicatorSnapshot};
use crate::models::{Direction, Trade};
use crate::Result;

/// Pairs tested for a crossover, in priority order
const CROSSOVER_PAIRS: [(IndicatorRole, IndicatorRole); 3] = [
    (IndicatorRole::Fast, IndicatorRole::Middle),
    (IndicatorRole::Price, IndicatorRole::Middle),
    (IndicatorRole::Price, IndicatorRole::Slow),
];

/// Offsets and thresholds for the crossover entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossoverSettings {
    pub spread: Decimal,
    pub entry_filter: Decimal,
    pub stop_loss_filter: Decimal,
    pub first_target_distance: Decimal,
    /// RSI level a long needs to reach; shorts mirror it around 50
    pub rsi_filter: Decimal,
}

/// Moving-average crossover entry with an RSI momentum gate
///
/// Looks at the last two values of each role. The first pair that crosses
/// decides: direction from which side the first series came from, then the
/// RSI gate and trend alignment against the slow average. The entry and
/// stop are offset from the crossing price; the trade is tradable unless
/// the daily average sits too far past the entry.
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    settings: CrossoverSettings,
}

impl CrossoverStrategy {
    pub fn new(settings: CrossoverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CrossoverSettings {
        &self.settings
    }

    fn segment(snapshot: &IndicatorSnapshot, role: IndicatorRole) -> Option<LineSegment> {
        snapshot
            .last_two(role)
            .map(|(previous, latest)| LineSegment::from_last_two(previous, latest))
    }

    fn rsi_allows(&self, direction: Direction, rsi: Decimal) -> bool {
        match direction {
            Direction::Up => rsi >= self.settings.rsi_filter,
            Direction::Down => rsi <= Decimal::ONE_HUNDRED - self.settings.rsi_filter,
            Direction::Flat => false,
        }
    }

    fn trend_aligned(direction: Direction, snapshot: &IndicatorSnapshot) -> bool {
        let (Some(fast), Some(middle), Some(slow)) = (
            snapshot.last_two(IndicatorRole::Fast),
            snapshot.last_two(IndicatorRole::Middle),
            snapshot.last_two(IndicatorRole::Slow),
        ) else {
            return false;
        };

        let bars = [(fast.0, middle.0, slow.0), (fast.1, middle.1, slow.1)];
        bars.iter().all(|&(f, m, s)| match direction {
            Direction::Up => f > s && m > s,
            Direction::Down => f < s && m < s,
            Direction::Flat => false,
        })
    }

    /// Entry, stop and tradability around a crossing price
    pub fn calculate_trade(
        &self,
        direction: Direction,
        intersection: Decimal,
        daily: Decimal,
    ) -> Trade {
        let s = &self.settings;
        match direction {
            Direction::Up => {
                let entry = intersection + s.entry_filter + s.spread;
                let stop = intersection - s.stop_loss_filter;
                let tradable = daily <= entry + s.first_target_distance;
                Trade::new(direction, entry, stop, tradable)
            }
            Direction::Down => {
                let entry = intersection - s.entry_filter;
                let stop = intersection + s.stop_loss_filter + s.spread;
                let tradable = daily >= entry - s.first_target_distance;
                Trade::new(direction, entry, stop, tradable)
            }
            Direction::Flat => Trade::flat(),
        }
    }
}

impl EntryStrategy for CrossoverStrategy {
    fn name(&self) -> &str {
        "crossover"
    }

    fn evaluate(&self, snapshot: &IndicatorSnapshot) -> Result<Trade> {
        for (first, second) in CROSSOVER_PAIRS {
            let a = Self::segment(snapshot, first);
            let b = Self::segment(snapshot, second);
            let (Some(a), Some(b)) = (a, b) else {
                continue;
            };
            if !a.intersects(&b)? {
                continue;
            }

            let before = a.start().price - b.start().price;
            let direction = if before.is_sign_negative() {
                Direction::Up
            } else {
                Direction::Down
            };

            let Some((rsi, _)) = snapshot.last_two(IndicatorRole::Rsi) else {
                return Ok(Trade::flat());
            };
            if !self.rsi_allows(direction, rsi) {
                tracing::debug!(
                    %direction,
                    %rsi,
                    pair = %format!("{}/{}", first, second),
                    "RSI gate rejected crossover"
                );
                return Ok(Trade::flat());
            }
            if !Self::trend_aligned(direction, snapshot) {
                tracing::debug!(%direction, "Crossover against the slow trend");
                return Ok(Trade::flat());
            }

            let (Some(intersection), Some(daily)) =
                (a.intersection_price(&b)?, snapshot.latest(IndicatorRole::Daily))
            else {
                return Ok(Trade::flat());
            };

            let trade = self.calculate_trade(direction, intersection, daily);
            tracing::info!(
                %direction,
                pair = %format!("{}/{}", first, second),
                intersection = %intersection,
                entry = %trade.entry_price(),
                stop = %trade.stop_loss_price(),
                tradable = trade.is_tradable(),
                "Crossover detected"
            );
            return Ok(trade);
        }

        Ok(Trade::flat())
    }
}
