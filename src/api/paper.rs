use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::BrokerGateway;
use crate::models::{
    round_price, BrokerTrade, Candle, Granularity, Order, OrderSettings, OrderType, Price,
};
use crate::{BotError, Result};

/// Mutating request the engine sent to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    SetStopLoss { trade_id: String, price: Decimal },
    CloseTrade { trade_id: String, units: i64 },
    PlaceOrder { settings: OrderSettings, order_type: OrderType },
    CancelOrder { order_id: String },
}

#[derive(Debug)]
struct PaperState {
    instrument: String,
    balance: Decimal,
    leverage: Decimal,
    price: Option<Price>,
    candles: HashMap<Granularity, Vec<Candle>>,
    orders: Vec<Order>,
    trades: Vec<BrokerTrade>,
    journal: Vec<BrokerCall>,
    failing_fetches: usize,
}

/// In-memory broker for paper trading and tests
///
/// Holds one account trading one instrument. Conditional entry orders fill
/// when the quote touches their trigger (ask for longs, bid for shorts) and
/// open trades are stopped out when the opposite side crosses their stop.
/// Every mutating call is journalled.
#[derive(Debug)]
pub struct PaperBroker {
    state: Mutex<PaperState>,
}

impl PaperBroker {
    pub fn new(instrument: &str, balance: Decimal, leverage: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                instrument: instrument.to_string(),
                balance,
                leverage,
                price: None,
                candles: HashMap::new(),
                orders: Vec::new(),
                trades: Vec::new(),
                journal: Vec::new(),
                failing_fetches: 0,
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, PaperState>> {
        self.state
            .lock()
            .map_err(|e| BotError::Broker(format!("paper broker state poisoned: {}", e)))
    }

    /// Publish a new quote, filling and stopping out as it implies
    pub fn publish_price(&self, price: Price) -> Result<()> {
        let mut state = self.state()?;
        state.fill_touched_orders(&price);
        state.stop_out(&price);
        state.price = Some(price);
        Ok(())
    }

    /// Publish a candle; a candle with an already-known open time replaces it
    pub fn publish_candle(&self, granularity: Granularity, candle: Candle) -> Result<()> {
        let mut state = self.state()?;
        let candles = state.candles.entry(granularity).or_default();
        match candles.last().map(Candle::time) {
            Some(last) if last == candle.time() => {
                let index = candles.len() - 1;
                candles[index] = candle;
            }
            Some(last) if last > candle.time() => {
                return Err(BotError::InvalidArgument(format!(
                    "candle at {} is older than the last published one",
                    candle.time()
                )));
            }
            _ => candles.push(candle),
        }
        Ok(())
    }

    /// Make the next `count` price/candle fetches fail transiently
    pub fn fail_next_fetches(&self, count: usize) -> Result<()> {
        self.state()?.failing_fetches = count;
        Ok(())
    }

    /// Put an already-open trade on the books
    pub fn open_trade(&self, trade: BrokerTrade) -> Result<()> {
        self.state()?.trades.push(trade);
        Ok(())
    }

    /// Put an already-pending order on the books
    pub fn add_order(&self, order: Order) -> Result<()> {
        self.state()?.orders.push(order);
        Ok(())
    }

    pub fn journal(&self) -> Result<Vec<BrokerCall>> {
        Ok(self.state()?.journal.clone())
    }

    pub fn trades(&self) -> Result<Vec<BrokerTrade>> {
        Ok(self.state()?.trades.clone())
    }

    pub fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.state()?.orders.clone())
    }
}

impl PaperState {
    fn check_instrument(&self, instrument: &str) -> Result<()> {
        if instrument != self.instrument {
            return Err(BotError::Broker(format!(
                "instrument {} is not traded on this account",
                instrument
            )));
        }
        Ok(())
    }

    fn consume_failure(&mut self) -> Result<()> {
        if self.failing_fetches > 0 {
            self.failing_fetches -= 1;
            return Err(BotError::TransientFeedFailure(
                "paper feed temporarily unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn margin_used(&self) -> Decimal {
        let units: i64 = self.trades.iter().map(|t| t.current_units.abs()).sum();
        round_price(Decimal::from(units) / self.leverage)
    }

    fn fill_touched_orders(&mut self, price: &Price) {
        let (touched, waiting): (Vec<Order>, Vec<Order>) =
            self.orders.drain(..).partition(|order| {
                order.order_type == OrderType::MarketIfTouched
                    && if order.is_long() {
                        price.ask() >= order.price
                    } else {
                        price.bid() <= order.price
                    }
            });
        self.orders = waiting;

        for order in touched {
            let open_price = if order.is_long() { price.ask() } else { price.bid() };
            tracing::info!(
                order_id = %order.id,
                units = order.units,
                price = %open_price,
                "Paper order filled"
            );
            self.trades.push(BrokerTrade {
                trade_id: order.id.clone(),
                stop_loss_order_id: order.stop_loss_price.map(|_| Uuid::new_v4().to_string()),
                open_price,
                stop_loss_price: order.stop_loss_price,
                initial_units: order.units,
                current_units: order.units,
            });
        }
    }

    fn stop_out(&mut self, price: &Price) {
        let mut realized = Decimal::ZERO;
        self.trades.retain(|trade| {
            let Some(stop) = trade.stop_loss_price else {
                return true;
            };
            let (hit, exit) = if trade.is_long() {
                (price.bid() <= stop, price.bid())
            } else {
                (price.ask() >= stop, price.ask())
            };
            if hit {
                realized += (exit - trade.open_price) * Decimal::from(trade.current_units);
                tracing::info!(trade_id = %trade.trade_id, stop = %stop, "Paper trade stopped out");
            }
            !hit
        });
        self.balance = round_price(self.balance + realized);
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn current_price(&self, instrument: &str) -> Result<Price> {
        let mut state = self.state()?;
        state.check_instrument(instrument)?;
        state.consume_failure()?;
        state
            .price
            .clone()
            .ok_or_else(|| BotError::TransientFeedFailure("no price published yet".to_string()))
    }

    async fn candles(
        &self,
        instrument: &str,
        quantity: usize,
        granularity: Granularity,
    ) -> Result<Vec<Candle>> {
        let mut state = self.state()?;
        state.check_instrument(instrument)?;
        state.consume_failure()?;
        let candles = state.candles.get(&granularity).map(Vec::as_slice).unwrap_or(&[]);
        let start = candles.len().saturating_sub(quantity);
        Ok(candles[start..].to_vec())
    }

    async fn trade(&self, instrument: &str, index: usize) -> Result<Option<BrokerTrade>> {
        let state = self.state()?;
        state.check_instrument(instrument)?;
        Ok(state.trades.get(index).cloned())
    }

    async fn pending_orders(&self, instrument: &str) -> Result<Vec<Order>> {
        let state = self.state()?;
        state.check_instrument(instrument)?;
        Ok(state.orders.clone())
    }

    async fn set_stop_loss(&self, trade_id: &str, price: Decimal) -> Result<()> {
        let mut state = self.state()?;
        state.journal.push(BrokerCall::SetStopLoss {
            trade_id: trade_id.to_string(),
            price,
        });
        let trade = state
            .trades
            .iter_mut()
            .find(|t| t.trade_id == trade_id)
            .ok_or_else(|| BotError::Broker(format!("no open trade {}", trade_id)))?;
        trade.stop_loss_price = Some(round_price(price));
        Ok(())
    }

    async fn close_trade(&self, trade_id: &str, units: i64) -> Result<()> {
        let mut state = self.state()?;
        state.journal.push(BrokerCall::CloseTrade {
            trade_id: trade_id.to_string(),
            units,
        });

        let price = state
            .price
            .clone()
            .ok_or_else(|| BotError::Broker("cannot close without a price".to_string()))?;
        let index = state
            .trades
            .iter()
            .position(|t| t.trade_id == trade_id)
            .ok_or_else(|| BotError::Broker(format!("no open trade {}", trade_id)))?;

        let trade = &mut state.trades[index];
        if units <= 0 || units > trade.current_units.abs() {
            return Err(BotError::Broker(format!(
                "cannot close {} units of a {} unit trade",
                units, trade.current_units
            )));
        }
        let signed = units * trade.current_units.signum();
        let exit = if trade.is_long() { price.bid() } else { price.ask() };
        let pnl = (exit - trade.open_price) * Decimal::from(signed);
        trade.current_units -= signed;
        let fully_closed = trade.current_units == 0;

        if fully_closed {
            state.trades.remove(index);
        }
        state.balance = round_price(state.balance + pnl);
        Ok(())
    }

    async fn place_order(&self, settings: &OrderSettings, order_type: OrderType) -> Result<String> {
        let mut state = self.state()?;
        state.check_instrument(&settings.instrument)?;
        state.journal.push(BrokerCall::PlaceOrder {
            settings: settings.clone(),
            order_type,
        });
        if settings.units == 0 {
            return Err(BotError::Broker("order for zero units".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        state.orders.push(Order {
            id: id.clone(),
            order_type,
            instrument: settings.instrument.clone(),
            units: settings.units,
            price: settings.price,
            stop_loss_price: settings.stop_loss_price,
        });
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let mut state = self.state()?;
        state.journal.push(BrokerCall::CancelOrder {
            order_id: order_id.to_string(),
        });
        let before = state.orders.len();
        state.orders.retain(|o| o.id != order_id);
        if state.orders.len() == before {
            return Err(BotError::Broker(format!("no pending order {}", order_id)));
        }
        Ok(())
    }

    async fn balance(&self) -> Result<Decimal> {
        Ok(self.state()?.balance)
    }

    async fn available_margin(&self) -> Result<Decimal> {
        let state = self.state()?;
        Ok(state.balance - state.margin_used())
    }

    async fn margin_used(&self) -> Result<Decimal> {
        Ok(self.state()?.margin_used())
    }

    async fn open_trades_count(&self) -> Result<usize> {
        Ok(self.state()?.trades.len())
    }

    async fn open_orders_count(&self) -> Result<usize> {
        Ok(self.state()?.orders.len())
    }

    async fn leverage(&self) -> Result<Decimal> {
        Ok(self.state()?.leverage)
    }
}
