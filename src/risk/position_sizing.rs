use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::OrderStrategy;
use crate::api::BrokerGateway;
use crate::models::{
    round_price, round_to, Direction, OrderSettings, OrderType, Price, Trade, PIP_VALUE_SCALE,
};
use crate::{BotError, Result};

/// Stop distances are counted in steps of the last quoted digit
///
/// That is the pipette (fifth decimal), ten to the `one_pip` of 0.0001, so
/// a 0.00200 stop is 200 here. `calculate_units_size` divides the budget
/// by pipettes times the value of a full pip; changing either side means
/// changing both.
const PIPS_PER_UNIT: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

/// Account-currency value of one pip per unit traded
pub fn pip_value(one_pip: Decimal, bid: Decimal) -> Result<Decimal> {
    if bid <= Decimal::ZERO {
        return Err(BotError::InvalidArgument(format!(
            "cannot value a pip at bid {}",
            bid
        )));
    }
    Ok(round_to(one_pip / bid, PIP_VALUE_SCALE))
}

/// Distance between entry and stop, in pips
pub fn stop_distance_pips(trade: &Trade) -> Decimal {
    round_price((trade.entry_price() - trade.stop_loss_price()).abs() * PIPS_PER_UNIT)
}

/// Fixed-fractional position size
///
/// Risks `balance * risk` over the stop distance. Signed by direction;
/// zero for a flat trade or a zero stop distance.
pub fn calculate_units_size(
    balance: Decimal,
    risk: Decimal,
    trade: &Trade,
    pip_value: Decimal,
) -> i64 {
    let pips = stop_distance_pips(trade);
    let pip_risk = pips * pip_value;
    if trade.direction() == Direction::Flat || pip_risk.is_zero() {
        return 0;
    }

    let budget = round_price(balance * risk);
    let units = (budget / pip_risk).floor().to_i64().unwrap_or(0);
    units * trade.direction().sign()
}

/// Risk a fixed fraction of the balance per trade
#[derive(Debug, Clone)]
pub struct FixedRiskOrderStrategy {
    risk_per_trade: Decimal,
    one_pip: Decimal,
    order_cancel_offset: Decimal,
}

impl FixedRiskOrderStrategy {
    pub fn new(risk_per_trade: Decimal, one_pip: Decimal, order_cancel_offset: Decimal) -> Self {
        Self {
            risk_per_trade,
            one_pip,
            order_cancel_offset,
        }
    }
}

#[async_trait]
impl OrderStrategy for FixedRiskOrderStrategy {
    fn name(&self) -> &str {
        "fixed_risk"
    }

    async fn place_trade_as_order(
        &self,
        gateway: &dyn BrokerGateway,
        instrument: &str,
        trade: &Trade,
        price: &Price,
    ) -> Result<Option<String>> {
        if !trade.is_actionable() {
            return Ok(None);
        }

        let balance = gateway.balance().await?;
        let pip_value = pip_value(self.one_pip, price.bid())?;
        let units = calculate_units_size(balance, self.risk_per_trade, trade, pip_value);
        if units == 0 {
            tracing::debug!(instrument = %instrument, "Order size rounds to zero, skipping");
            return Ok(None);
        }

        let leverage = gateway.leverage().await?;
        if leverage <= Decimal::ZERO {
            return Err(BotError::Broker(format!("account leverage is {}", leverage)));
        }
        let margin_used = gateway.margin_used().await?;
        let projected = round_price(margin_used + Decimal::from(units.abs()) / leverage);
        let available = gateway.available_margin().await?;
        if available <= projected {
            tracing::warn!(
                instrument = %instrument,
                units,
                available = %available,
                projected = %projected,
                "Not enough margin, order skipped"
            );
            return Ok(None);
        }

        let settings = OrderSettings {
            instrument: instrument.to_string(),
            units,
            price: trade.entry_price(),
            stop_loss_price: Some(trade.stop_loss_price()),
        };
        let order_id = gateway
            .place_order(&settings, OrderType::MarketIfTouched)
            .await?;

        tracing::info!(
            instrument = %instrument,
            order_id = %order_id,
            units,
            available_units = price.available_units(),
            entry = %settings.price,
            stop = %trade.stop_loss_price(),
            "Entry order placed"
        );

        Ok(Some(order_id))
    }

    async fn close_unfilled_orders(
        &self,
        gateway: &dyn BrokerGateway,
        instrument: &str,
        price: &Price,
    ) -> Result<Vec<String>> {
        let mut cancelled = Vec::new();

        for order in gateway.pending_orders(instrument).await? {
            if order.order_type != OrderType::MarketIfTouched {
                continue;
            }
            let Some(stop) = order.stop_loss_price else {
                continue;
            };

            let drift = if order.is_long() {
                stop - price.bid()
            } else {
                price.ask() - stop
            };
            if drift > self.order_cancel_offset {
                gateway.cancel_order(&order.id).await?;
                tracing::info!(
                    instrument = %instrument,
                    order_id = %order.id,
                    stop = %stop,
                    drift = %drift,
                    "Stale entry order cancelled"
                );
                cancelled.push(order.id);
            }
        }

        Ok(cancelled)
    }
}
