use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::round_price;

/// Side of a candidate trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    /// +1 for long, -1 for short, 0 for no trade
    pub fn sign(self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
            Direction::Flat => 0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("UP"),
            Direction::Down => f.write_str("DOWN"),
            Direction::Flat => f.write_str("FLAT"),
        }
    }
}

/// Candidate trade produced by an entry strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trade {
    direction: Direction,
    entry_price: Decimal,
    stop_loss_price: Decimal,
    tradable: bool,
}

impl Trade {
    pub fn new(
        direction: Direction,
        entry_price: Decimal,
        stop_loss_price: Decimal,
        tradable: bool,
    ) -> Self {
        Self {
            direction,
            entry_price: round_price(entry_price),
            stop_loss_price: round_price(stop_loss_price),
            tradable,
        }
    }

    /// The "nothing to do" trade
    pub fn flat() -> Self {
        Self::new(Direction::Flat, Decimal::ZERO, Decimal::ZERO, false)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn stop_loss_price(&self) -> Decimal {
        self.stop_loss_price
    }

    pub fn is_tradable(&self) -> bool {
        self.tradable
    }

    /// Worth sending to order sizing at all
    pub fn is_actionable(&self) -> bool {
        self.tradable && self.direction != Direction::Flat
    }
}

impl Default for Trade {
    fn default() -> Self {
        Self::flat()
    }
}

/// Open position as reported by the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerTrade {
    pub trade_id: String,
    pub stop_loss_order_id: Option<String>,
    pub open_price: Decimal,
    pub stop_loss_price: Option<Decimal>,
    /// Signed: positive = long
    pub initial_units: i64,
    pub current_units: i64,
}

impl BrokerTrade {
    pub fn is_long(&self) -> bool {
        self.initial_units > 0
    }

    pub fn direction(&self) -> Direction {
        match self.initial_units.signum() {
            1 => Direction::Up,
            -1 => Direction::Down,
            _ => Direction::Flat,
        }
    }

    /// Part of the original position has already been closed
    pub fn is_partially_closed(&self) -> bool {
        self.current_units != self.initial_units
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Conditional entry that fills once price touches the trigger
    MarketIfTouched,
    Limit,
    Market,
    StopLoss,
}

/// What to ask the broker for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettings {
    pub instrument: String,
    pub units: i64,
    pub price: Decimal,
    pub stop_loss_price: Option<Decimal>,
}

/// Order known to the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_type: OrderType,
    pub instrument: String,
    pub units: i64,
    pub price: Decimal,
    pub stop_loss_price: Option<Decimal>,
}

impl Order {
    pub fn is_long(&self) -> bool {
        self.units > 0
    }
}
