use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::exit::{ExitState, ExitStrategy};
use super::market_data::MarketData;
use super::price_feed::PriceObserver;
use crate::api::BrokerGateway;
use crate::models::{Granularity, Price};
use crate::risk::OrderStrategy;
use crate::strategy::EntryStrategy;
use crate::Result;

/// What the position manager did on one price
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAction {
    /// No signal, or the signal was not worth an order
    Idle,
    EntryPlaced(String),
    /// Pending entry orders were checked; these were cancelled
    OrdersChecked(Vec<String>),
    /// An open trade went through the exit plan
    ExitManaged,
}

/// Decides what to do with the account on every new price
///
/// With an open trade it runs the exit strategy. With only a pending entry
/// it retires the entry if the market left it behind. With neither it asks
/// the entry strategy for a trade and hands it to order sizing.
pub struct PositionManager {
    gateway: Arc<dyn BrokerGateway>,
    instrument: String,
    market: Arc<Mutex<MarketData>>,
    entry: Box<dyn EntryStrategy>,
    orders: Box<dyn OrderStrategy>,
    exit: Box<dyn ExitStrategy>,
    exit_granularity: Granularity,
    exit_state: Mutex<ExitState>,
}

impl PositionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn BrokerGateway>,
        instrument: &str,
        market: Arc<Mutex<MarketData>>,
        entry: Box<dyn EntryStrategy>,
        orders: Box<dyn OrderStrategy>,
        exit: Box<dyn ExitStrategy>,
        exit_granularity: Granularity,
    ) -> Self {
        Self {
            gateway,
            instrument: instrument.to_string(),
            market,
            entry,
            orders,
            exit,
            exit_granularity,
            exit_state: Mutex::new(ExitState::default()),
        }
    }

    pub async fn exit_state(&self) -> ExitState {
        self.exit_state.lock().await.clone()
    }

    /// Run one decision cycle
    pub async fn decide(&self, price: &Price) -> Result<CycleAction> {
        let gateway = self.gateway.as_ref();

        if let Some(trade) = gateway.trade(&self.instrument, 0).await? {
            let candles = self.market.lock().await.candles(self.exit_granularity);
            let mut state = self.exit_state.lock().await;
            let current = std::mem::take(&mut *state);
            *state = self
                .exit
                .manage(gateway, &trade, price, &candles, current)
                .await?;
            return Ok(CycleAction::ExitManaged);
        }

        *self.exit_state.lock().await = ExitState::default();

        if gateway.open_orders_count().await? > 0 {
            let cancelled = self
                .orders
                .close_unfilled_orders(gateway, &self.instrument, price)
                .await?;
            return Ok(CycleAction::OrdersChecked(cancelled));
        }

        let snapshot = self.market.lock().await.snapshot();
        let trade = self.entry.evaluate(&snapshot)?;
        if !trade.is_actionable() {
            return Ok(CycleAction::Idle);
        }

        match self
            .orders
            .place_trade_as_order(gateway, &self.instrument, &trade, price)
            .await?
        {
            Some(order_id) => Ok(CycleAction::EntryPlaced(order_id)),
            None => Ok(CycleAction::Idle),
        }
    }
}

#[async_trait]
impl PriceObserver for PositionManager {
    fn name(&self) -> &str {
        "position-manager"
    }

    async fn on_price(&self, price: &Price) -> Result<()> {
        let action = self.decide(price).await?;
        if action != CycleAction::Idle {
            tracing::debug!(instrument = %self.instrument, ?action, "Decision cycle complete");
        }
        Ok(())
    }
}
