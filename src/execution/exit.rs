use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::BrokerGateway;
use crate::config::StrategyConfig;
use crate::models::{round_price, BrokerTrade, Candle, Price};
use crate::{BotError, Result};

/// Where an open position is in its exit plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitPhase {
    /// Nothing closed yet
    OpenFull,
    /// First target taken, the rest trails behind exit bars
    HalfClosedTrailing,
}

impl ExitPhase {
    /// Phase implied by the broker's unit counts
    pub fn of(trade: &BrokerTrade) -> Self {
        if trade.is_partially_closed() {
            ExitPhase::HalfClosedTrailing
        } else {
            ExitPhase::OpenFull
        }
    }
}

impl fmt::Display for ExitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitPhase::OpenFull => f.write_str("OPEN_FULL"),
            ExitPhase::HalfClosedTrailing => f.write_str("HALF_CLOSED_TRAILING"),
        }
    }
}

/// Most favourable confirmed bar range so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitBar {
    pub high: Decimal,
    pub low: Decimal,
}

impl ExitBar {
    pub fn seeded(price: Decimal) -> Self {
        Self {
            high: price,
            low: price,
        }
    }
}

/// Exit bookkeeping carried from one decision cycle to the next
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitState {
    pub phase: Option<ExitPhase>,
    pub trade_id: Option<String>,
    pub exit_bar: Option<ExitBar>,
    /// Open time of the last exit-granularity bar evaluated
    pub last_bar_time: Option<DateTime<Utc>>,
}

impl ExitState {
    /// State for `trade`, discarding anything left over from another trade
    pub fn for_trade(self, trade: &BrokerTrade) -> Self {
        let mut state = if self.trade_id.as_deref() == Some(trade.trade_id.as_str()) {
            self
        } else {
            ExitState {
                trade_id: Some(trade.trade_id.clone()),
                ..ExitState::default()
            }
        };
        state.phase = Some(ExitPhase::of(trade));
        state
    }
}

/// Distances and fractions driving the exit plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSettings {
    pub break_even_distance: Decimal,
    pub first_target_distance: Decimal,
    pub partial_close_fraction: Decimal,
}

/// Manages an open position until the broker closes it
#[async_trait]
pub trait ExitStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Run one decision cycle. `exit_candles` is the exit-granularity history.
    async fn manage(
        &self,
        gateway: &dyn BrokerGateway,
        trade: &BrokerTrade,
        price: &Price,
        exit_candles: &[Candle],
        state: ExitState,
    ) -> Result<ExitState>;
}

/// Break-even, then half off at the first target, then trail the rest
#[derive(Debug, Clone)]
pub struct HalfCloseTrailingExit {
    settings: ExitSettings,
}

impl HalfCloseTrailingExit {
    pub fn new(settings: ExitSettings) -> Self {
        Self { settings }
    }

    /// Price progress in the trade's favour
    fn favourable_move(trade: &BrokerTrade, price: &Price) -> Decimal {
        if trade.is_long() {
            price.bid() - trade.open_price
        } else {
            trade.open_price - price.ask()
        }
    }

    /// Whether `candidate` would tighten the current stop
    fn tightens(trade: &BrokerTrade, stop: Option<Decimal>, candidate: Decimal) -> bool {
        match stop {
            None => true,
            Some(stop) if trade.is_long() => candidate > stop,
            Some(stop) => candidate < stop,
        }
    }

    async fn break_even(
        &self,
        gateway: &dyn BrokerGateway,
        trade: &BrokerTrade,
        price: &Price,
        stop: Option<Decimal>,
    ) -> Result<Option<Decimal>> {
        if !Self::tightens(trade, stop, trade.open_price) {
            return Ok(stop);
        }
        if Self::favourable_move(trade, price) < self.settings.break_even_distance {
            return Ok(stop);
        }

        gateway.set_stop_loss(&trade.trade_id, trade.open_price).await?;
        tracing::info!(
            trade_id = %trade.trade_id,
            stop = %trade.open_price,
            "Stop moved to break-even"
        );
        Ok(Some(trade.open_price))
    }

    /// Returns true when part of the position was closed
    async fn partial_close(
        &self,
        gateway: &dyn BrokerGateway,
        trade: &BrokerTrade,
        price: &Price,
    ) -> Result<bool> {
        if Self::favourable_move(trade, price) < self.settings.first_target_distance {
            return Ok(false);
        }

        let units = (Decimal::from(trade.current_units.abs()) * self.settings.partial_close_fraction)
            .floor()
            .to_i64()
            .unwrap_or(0);
        if units <= 0 {
            return Ok(false);
        }

        gateway.close_trade(&trade.trade_id, units).await?;
        tracing::info!(
            trade_id = %trade.trade_id,
            units,
            remaining = trade.current_units.abs() - units,
            "First target reached, position partially closed"
        );
        Ok(true)
    }

    async fn trail(
        &self,
        gateway: &dyn BrokerGateway,
        trade: &BrokerTrade,
        stop: Option<Decimal>,
        exit_candles: &[Candle],
        mut state: ExitState,
    ) -> Result<ExitState> {
        let mut exit_bar = state
            .exit_bar
            .unwrap_or_else(|| ExitBar::seeded(trade.open_price));

        let Some(bar) = exit_candles.iter().rev().find(|c| c.is_complete()) else {
            state.exit_bar = Some(exit_bar);
            return Ok(state);
        };
        if state.last_bar_time == Some(bar.time()) {
            state.exit_bar = Some(exit_bar);
            return Ok(state);
        }
        state.last_bar_time = Some(bar.time());

        let candidate = if trade.is_long() {
            if !(bar.close() > exit_bar.high && bar.low() > exit_bar.low) {
                state.exit_bar = Some(exit_bar);
                return Ok(state);
            }
            exit_bar.high = exit_bar.high.max(bar.high());
            exit_bar.low = exit_bar.low.max(bar.low());
            exit_bar.low
        } else {
            if !(bar.close() < exit_bar.low && bar.high() < exit_bar.high) {
                state.exit_bar = Some(exit_bar);
                return Ok(state);
            }
            exit_bar.low = exit_bar.low.min(bar.low());
            exit_bar.high = exit_bar.high.min(bar.high());
            exit_bar.high
        };
        state.exit_bar = Some(exit_bar);

        tracing::debug!(
            trade_id = %trade.trade_id,
            high = %exit_bar.high,
            low = %exit_bar.low,
            "Exit bar advanced"
        );

        let candidate = round_price(candidate);
        if Self::tightens(trade, stop, candidate) {
            gateway.set_stop_loss(&trade.trade_id, candidate).await?;
            tracing::info!(trade_id = %trade.trade_id, stop = %candidate, "Trailing stop tightened");
        }

        Ok(state)
    }
}

#[async_trait]
impl ExitStrategy for HalfCloseTrailingExit {
    fn name(&self) -> &str {
        "half_close_trailing"
    }

    async fn manage(
        &self,
        gateway: &dyn BrokerGateway,
        trade: &BrokerTrade,
        price: &Price,
        exit_candles: &[Candle],
        state: ExitState,
    ) -> Result<ExitState> {
        let mut state = state.for_trade(trade);
        let stop = self
            .break_even(gateway, trade, price, trade.stop_loss_price)
            .await?;

        match state.phase {
            Some(ExitPhase::HalfClosedTrailing) => {
                self.trail(gateway, trade, stop, exit_candles, state).await
            }
            _ => {
                if self.partial_close(gateway, trade, price).await? {
                    state.phase = Some(ExitPhase::HalfClosedTrailing);
                    state.exit_bar = Some(ExitBar::seeded(trade.open_price));
                }
                Ok(state)
            }
        }
    }
}

type ExitConstructor = fn(&StrategyConfig) -> Box<dyn ExitStrategy>;

fn build_half_close_trailing(config: &StrategyConfig) -> Box<dyn ExitStrategy> {
    Box::new(HalfCloseTrailingExit::new(config.exit_settings()))
}

const EXIT_STRATEGIES: &[(&str, ExitConstructor)] =
    &[("half_close_trailing", build_half_close_trailing)];

/// Names accepted by `build_exit_strategy`
pub fn exit_strategy_names() -> impl Iterator<Item = &'static str> {
    EXIT_STRATEGIES.iter().map(|(name, _)| *name)
}

pub fn build_exit_strategy(name: &str, config: &StrategyConfig) -> Result<Box<dyn ExitStrategy>> {
    let wanted = name.trim().to_ascii_lowercase();
    EXIT_STRATEGIES
        .iter()
        .find(|(key, _)| *key == wanted)
        .map(|(_, build)| build(config))
        .ok_or_else(|| BotError::unknown("exit strategy", name))
}
