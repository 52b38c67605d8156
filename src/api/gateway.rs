use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{BrokerTrade, Candle, Granularity, Order, OrderSettings, OrderType, Price};
use crate::Result;

/// Everything the engine needs from a broker
///
/// Implementations hand back already-validated domain values. Fetch failures
/// that may clear up on their own must be reported as
/// `BotError::TransientFeedFailure` so the feed boundary can retry them;
/// anything else is treated as a hard failure of the current cycle.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn current_price(&self, instrument: &str) -> Result<Price>;

    /// Most recent `quantity` candles, oldest first. The newest may still be forming.
    async fn candles(
        &self,
        instrument: &str,
        quantity: usize,
        granularity: Granularity,
    ) -> Result<Vec<Candle>>;

    /// Open trade at `index` (0 = oldest), if there is one
    async fn trade(&self, instrument: &str, index: usize) -> Result<Option<BrokerTrade>>;

    async fn pending_orders(&self, instrument: &str) -> Result<Vec<Order>>;

    async fn set_stop_loss(&self, trade_id: &str, price: Decimal) -> Result<()>;

    /// Close `units` (absolute) of an open trade
    async fn close_trade(&self, trade_id: &str, units: i64) -> Result<()>;

    /// Returns the id of the new order
    async fn place_order(&self, settings: &OrderSettings, order_type: OrderType) -> Result<String>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn balance(&self) -> Result<Decimal>;

    async fn available_margin(&self) -> Result<Decimal>;

    async fn margin_used(&self) -> Result<Decimal>;

    async fn open_trades_count(&self) -> Result<usize>;

    async fn open_orders_count(&self) -> Result<usize>;

    async fn leverage(&self) -> Result<Decimal>;
}
