// Order sizing and placement
pub mod position_sizing;

pub use position_sizing::{
    calculate_units_size, pip_value, stop_distance_pips, FixedRiskOrderStrategy,
};

use async_trait::async_trait;

use crate::api::BrokerGateway;
use crate::config::StrategyConfig;
use crate::models::{Price, Trade};
use crate::{BotError, Result};

/// Turns candidate trades into broker orders and retires stale ones
#[async_trait]
pub trait OrderStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Size the trade and place it as a conditional entry order.
    /// Returns the order id, or `None` when nothing was placed.
    async fn place_trade_as_order(
        &self,
        gateway: &dyn BrokerGateway,
        instrument: &str,
        trade: &Trade,
        price: &Price,
    ) -> Result<Option<String>>;

    /// Cancel pending entries the market has moved away from.
    /// Returns the cancelled order ids.
    async fn close_unfilled_orders(
        &self,
        gateway: &dyn BrokerGateway,
        instrument: &str,
        price: &Price,
    ) -> Result<Vec<String>>;
}

type OrderConstructor = fn(&StrategyConfig) -> Box<dyn OrderStrategy>;

fn build_fixed_risk(config: &StrategyConfig) -> Box<dyn OrderStrategy> {
    Box::new(FixedRiskOrderStrategy::new(
        config.risk_per_trade,
        config.one_pip,
        config.order_cancel_offset,
    ))
}

const ORDER_STRATEGIES: &[(&str, OrderConstructor)] = &[("fixed_risk", build_fixed_risk)];

/// Names accepted by `build_order_strategy`
pub fn order_strategy_names() -> impl Iterator<Item = &'static str> {
    ORDER_STRATEGIES.iter().map(|(name, _)| *name)
}

pub fn build_order_strategy(name: &str, config: &StrategyConfig) -> Result<Box<dyn OrderStrategy>> {
    let wanted = name.trim().to_ascii_lowercase();
    ORDER_STRATEGIES
        .iter()
        .find(|(key, _)| *key == wanted)
        .map(|(_, build)| build(config))
        .ok_or_else(|| BotError::unknown("order strategy", name))
}
