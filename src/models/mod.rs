mod candle;
mod price;
mod trade;

pub use candle::{Candle, CandlePriceType, Granularity, Ohlc};
pub use price::Price;
pub use trade::{BrokerTrade, Direction, Order, OrderSettings, OrderType, Trade};

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits carried by every monetary value
pub const PRICE_SCALE: u32 = 5;

/// Fractional digits carried by a pip value
pub const PIP_VALUE_SCALE: u32 = 7;

/// Round half-up to `scale` digits and pad to exactly that many
pub fn round_to(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded
}

/// Round a monetary value to the engine's 5-digit precision
pub fn round_price(value: Decimal) -> Decimal {
    round_to(value, PRICE_SCALE)
}
