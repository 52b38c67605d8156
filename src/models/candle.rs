use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::round_price;
use crate::{BotError, Result};

/// Bar length selector understood by the broker gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    S5,
    S10,
    S15,
    S30,
    M1,
    M2,
    M4,
    M5,
    M10,
    M15,
    M30,
    H1,
    H2,
    H3,
    H4,
    H6,
    H8,
    H12,
    D,
    W,
    M,
}

impl Granularity {
    pub const ALL: [Granularity; 21] = [
        Granularity::S5,
        Granularity::S10,
        Granularity::S15,
        Granularity::S30,
        Granularity::M1,
        Granularity::M2,
        Granularity::M4,
        Granularity::M5,
        Granularity::M10,
        Granularity::M15,
        Granularity::M30,
        Granularity::H1,
        Granularity::H2,
        Granularity::H3,
        Granularity::H4,
        Granularity::H6,
        Granularity::H8,
        Granularity::H12,
        Granularity::D,
        Granularity::W,
        Granularity::M,
    ];

    /// Bar length in seconds
    pub fn seconds(self) -> i64 {
        match self {
            Granularity::S5 => 5,
            Granularity::S10 => 10,
            Granularity::S15 => 15,
            Granularity::S30 => 30,
            Granularity::M1 => 60,
            Granularity::M2 => 120,
            Granularity::M4 => 240,
            Granularity::M5 => 300,
            Granularity::M10 => 600,
            Granularity::M15 => 900,
            Granularity::M30 => 1_800,
            Granularity::H1 => 3_600,
            Granularity::H2 => 7_200,
            Granularity::H3 => 10_800,
            Granularity::H4 => 14_400,
            Granularity::H6 => 21_600,
            Granularity::H8 => 28_800,
            Granularity::H12 => 43_200,
            Granularity::D => 86_400,
            Granularity::W => 604_800,
            Granularity::M => 2_592_000,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    pub fn name(self) -> &'static str {
        match self {
            Granularity::S5 => "S5",
            Granularity::S10 => "S10",
            Granularity::S15 => "S15",
            Granularity::S30 => "S30",
            Granularity::M1 => "M1",
            Granularity::M2 => "M2",
            Granularity::M4 => "M4",
            Granularity::M5 => "M5",
            Granularity::M10 => "M10",
            Granularity::M15 => "M15",
            Granularity::M30 => "M30",
            Granularity::H1 => "H1",
            Granularity::H2 => "H2",
            Granularity::H3 => "H3",
            Granularity::H4 => "H4",
            Granularity::H6 => "H6",
            Granularity::H8 => "H8",
            Granularity::H12 => "H12",
            Granularity::D => "D",
            Granularity::W => "W",
            Granularity::M => "M",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Granularity {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Granularity::ALL
            .iter()
            .copied()
            .find(|g| g.name() == wanted)
            .ok_or_else(|| BotError::unknown("granularity", s))
    }
}

impl TryFrom<String> for Granularity {
    type Error = BotError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Granularity> for String {
    fn from(value: Granularity) -> Self {
        value.name().to_string()
    }
}

/// Which part of a candle an indicator reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CandlePriceType {
    Open,
    Close,
    High,
    Low,
    /// (high + low) / 2
    Median,
}

impl CandlePriceType {
    pub fn name(self) -> &'static str {
        match self {
            CandlePriceType::Open => "OPEN",
            CandlePriceType::Close => "CLOSE",
            CandlePriceType::High => "HIGH",
            CandlePriceType::Low => "LOW",
            CandlePriceType::Median => "MEDIAN",
        }
    }
}

impl fmt::Display for CandlePriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CandlePriceType {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(CandlePriceType::Open),
            "CLOSE" => Ok(CandlePriceType::Close),
            "HIGH" => Ok(CandlePriceType::High),
            "LOW" => Ok(CandlePriceType::Low),
            "MEDIAN" => Ok(CandlePriceType::Median),
            _ => Err(BotError::unknown("candle price type", s)),
        }
    }
}

impl TryFrom<String> for CandlePriceType {
    type Error = BotError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CandlePriceType> for String {
    fn from(value: CandlePriceType) -> Self {
        value.name().to_string()
    }
}

/// Raw open/high/low/close quadruple handed to [`Candle::new`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ohlc {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Ohlc {
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self {
            open,
            high,
            low,
            close,
        }
    }

    /// A bar where every price is the same
    pub fn flat(price: Decimal) -> Self {
        Self::new(price, price, price, price)
    }
}

/// Completed (or forming) OHLCV bar, validated at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candle {
    time: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: u64,
    timeframe_secs: u32,
    complete: bool,
}

impl Candle {
    pub const MIN_TIMEFRAME_SECS: i64 = 5;
    pub const MAX_TIMEFRAME_SECS: i64 = 2_592_000;

    pub fn new(
        time: DateTime<Utc>,
        ohlc: Ohlc,
        volume: i64,
        timeframe_secs: i64,
        complete: bool,
    ) -> Result<Self> {
        for (name, value) in [
            ("open", ohlc.open),
            ("high", ohlc.high),
            ("low", ohlc.low),
            ("close", ohlc.close),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(BotError::NegativeValue {
                    name,
                    value: value.to_string(),
                });
            }
        }
        if volume < 0 {
            return Err(BotError::NegativeValue {
                name: "volume",
                value: volume.to_string(),
            });
        }
        if !(Self::MIN_TIMEFRAME_SECS..=Self::MAX_TIMEFRAME_SECS).contains(&timeframe_secs) {
            return Err(BotError::OutOfRange {
                name: "timeframe",
                value: timeframe_secs,
                min: Self::MIN_TIMEFRAME_SECS,
                max: Self::MAX_TIMEFRAME_SECS,
            });
        }

        Ok(Self {
            time,
            open: round_price(ohlc.open),
            high: round_price(ohlc.high),
            low: round_price(ohlc.low),
            close: round_price(ohlc.close),
            volume: volume as u64,
            timeframe_secs: timeframe_secs as u32,
            complete,
        })
    }

    /// Complete candle of a known granularity
    pub fn completed(
        time: DateTime<Utc>,
        ohlc: Ohlc,
        volume: i64,
        granularity: Granularity,
    ) -> Result<Self> {
        Self::new(time, ohlc, volume, granularity.seconds(), true)
    }

    /// Open time of the bar
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn open(&self) -> Decimal {
        self.open
    }

    pub fn high(&self) -> Decimal {
        self.high
    }

    pub fn low(&self) -> Decimal {
        self.low
    }

    pub fn close(&self) -> Decimal {
        self.close
    }

    pub fn volume(&self) -> u64 {
        self.volume
    }

    pub fn timeframe_secs(&self) -> u32 {
        self.timeframe_secs
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Time at which the bar stops forming
    pub fn close_time(&self) -> DateTime<Utc> {
        self.time + Duration::seconds(i64::from(self.timeframe_secs))
    }

    /// Read the requested price source off this bar
    pub fn price(&self, kind: CandlePriceType) -> Decimal {
        match kind {
            CandlePriceType::Open => self.open,
            CandlePriceType::Close => self.close,
            CandlePriceType::High => self.high,
            CandlePriceType::Low => self.low,
            CandlePriceType::Median => round_price((self.high + self.low) / Decimal::TWO),
        }
    }
}
