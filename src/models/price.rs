use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::round_price;
use crate::{BotError, Result};

/// One quote from the price feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Price {
    time: DateTime<Utc>,
    ask: Decimal,
    bid: Decimal,
    tradable: bool,
    available_units: i64,
}

impl Price {
    pub fn new(
        time: DateTime<Utc>,
        ask: Decimal,
        bid: Decimal,
        tradable: bool,
        available_units: i64,
    ) -> Result<Self> {
        for (name, value) in [("ask", ask), ("bid", bid)] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(BotError::NegativeValue {
                    name,
                    value: value.to_string(),
                });
            }
        }
        if available_units < 0 {
            return Err(BotError::NegativeValue {
                name: "available units",
                value: available_units.to_string(),
            });
        }

        Ok(Self {
            time,
            ask: round_price(ask),
            bid: round_price(bid),
            tradable,
            available_units,
        })
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn ask(&self) -> Decimal {
        self.ask
    }

    pub fn bid(&self) -> Decimal {
        self.bid
    }

    pub fn is_tradable(&self) -> bool {
        self.tradable
    }

    pub fn available_units(&self) -> i64 {
        self.available_units
    }

    /// Same ask and bid, regardless of when they were quoted
    pub fn same_quote(&self, other: &Price) -> bool {
        self.ask == other.ask && self.bid == other.bid
    }
}
