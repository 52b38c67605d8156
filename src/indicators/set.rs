use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{build_indicator, Indicator, IndicatorSettings};
use crate::models::{Candle, Granularity};
use crate::{BotError, Result};

/// Part an indicator plays in the crossover strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IndicatorRole {
    Fast,
    Middle,
    Slow,
    /// Same-timeframe average standing in for price itself
    Price,
    /// Higher-timeframe reference average
    Daily,
    Rsi,
}

impl IndicatorRole {
    pub const ALL: [IndicatorRole; 6] = [
        IndicatorRole::Fast,
        IndicatorRole::Middle,
        IndicatorRole::Slow,
        IndicatorRole::Price,
        IndicatorRole::Daily,
        IndicatorRole::Rsi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IndicatorRole::Fast => "fast",
            IndicatorRole::Middle => "middle",
            IndicatorRole::Slow => "slow",
            IndicatorRole::Price => "price",
            IndicatorRole::Daily => "daily",
            IndicatorRole::Rsi => "rsi",
        }
    }
}

impl fmt::Display for IndicatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndicatorRole {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        IndicatorRole::ALL
            .iter()
            .copied()
            .find(|role| role.name() == wanted)
            .ok_or_else(|| BotError::unknown("indicator role", s))
    }
}

impl TryFrom<String> for IndicatorRole {
    type Error = BotError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IndicatorRole> for String {
    fn from(value: IndicatorRole) -> Self {
        value.name().to_string()
    }
}

/// Latest values of every role, oldest first, at most `SNAPSHOT_DEPTH` each
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSnapshot {
    values: HashMap<IndicatorRole, Vec<Decimal>>,
}

impl IndicatorSnapshot {
    pub const SNAPSHOT_DEPTH: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tail of a series for a role
    pub fn with(mut self, role: IndicatorRole, values: &[Decimal]) -> Self {
        let start = values.len().saturating_sub(Self::SNAPSHOT_DEPTH);
        self.values.insert(role, values[start..].to_vec());
        self
    }

    pub fn values(&self, role: IndicatorRole) -> &[Decimal] {
        self.values.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The last two values of a role as (previous, latest)
    pub fn last_two(&self, role: IndicatorRole) -> Option<(Decimal, Decimal)> {
        match self.values(role) {
            [.., previous, latest] => Some((*previous, *latest)),
            _ => None,
        }
    }

    pub fn latest(&self, role: IndicatorRole) -> Option<Decimal> {
        self.values(role).last().copied()
    }
}

/// Role-keyed indicators, complete by construction
pub struct IndicatorSet {
    indicators: BTreeMap<IndicatorRole, Box<dyn Indicator>>,
}

impl IndicatorSet {
    /// Assemble a set, rejecting duplicate or missing roles
    pub fn new(indicators: Vec<Box<dyn Indicator>>) -> Result<Self> {
        let mut by_role = BTreeMap::new();
        for indicator in indicators {
            let role = indicator.settings().role;
            if by_role.insert(role, indicator).is_some() {
                return Err(BotError::InvalidArgument(format!(
                    "indicator role {} configured twice",
                    role
                )));
            }
        }

        let missing: Vec<&str> = IndicatorRole::ALL
            .iter()
            .filter(|role| !by_role.contains_key(role))
            .map(|role| role.name())
            .collect();
        if !missing.is_empty() {
            return Err(BotError::InvalidArgument(format!(
                "missing indicator roles: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            indicators: by_role,
        })
    }

    /// Build every configured indicator from the history of its granularity
    pub fn build(
        settings: &[IndicatorSettings],
        history: &HashMap<Granularity, Vec<Candle>>,
    ) -> Result<Self> {
        let indicators = settings
            .iter()
            .map(|s| {
                let candles = history.get(&s.granularity).map(Vec::as_slice).unwrap_or(&[]);
                build_indicator(s.clone(), candles)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(indicators)
    }

    /// Granularities whose candles this set reads
    pub fn get(&self, role: IndicatorRole) -> Option<&dyn Indicator> {
        self.indicators.get(&role).map(|i| i.as_ref())
    }

    /// Feed each indicator the latest candles of its granularity.
    /// Returns the number of values appended across the set.
    pub fn update(&mut self, candles: &HashMap<Granularity, Vec<Candle>>) -> Result<usize> {
        let mut appended = 0;
        for indicator in self.indicators.values_mut() {
            if let Some(history) = candles.get(&indicator.settings().granularity) {
                appended += indicator.update(history)?;
            }
        }
        Ok(appended)
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        self.indicators
            .iter()
            .fold(IndicatorSnapshot::new(), |snapshot, (role, indicator)| {
                snapshot.with(*role, indicator.values())
            })
    }
}

impl fmt::Debug for IndicatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.indicators
                    .iter()
                    .map(|(role, i)| (role, (i.settings().kind, i.settings().period, i.last()))),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{candle_at, closes};
    use crate::indicators::IndicatorKind;
    use crate::models::CandlePriceType;
    use rust_decimal_macros::dec;

    fn setting(kind: IndicatorKind, role: IndicatorRole, period: usize) -> IndicatorSettings {
        let granularity = if role == IndicatorRole::Daily {
            Granularity::D
        } else {
            Granularity::M30
        };
        IndicatorSettings::new(kind, role, period, CandlePriceType::Close, granularity)
    }

    fn full_settings() -> Vec<IndicatorSettings> {
        vec![
            setting(IndicatorKind::Ema, IndicatorRole::Fast, 2),
            setting(IndicatorKind::Ema, IndicatorRole::Middle, 3),
            setting(IndicatorKind::Sma, IndicatorRole::Slow, 4),
            setting(IndicatorKind::Sma, IndicatorRole::Price, 1),
            setting(IndicatorKind::Sma, IndicatorRole::Daily, 2),
            setting(IndicatorKind::Rsi, IndicatorRole::Rsi, 3),
        ]
    }

    fn history() -> HashMap<Granularity, Vec<Candle>> {
        let mut history = HashMap::new();
        history.insert(
            Granularity::M30,
            closes(&["1.10", "1.11", "1.12", "1.13", "1.14", "1.15"]),
        );
        history.insert(Granularity::D, closes(&["1.00", "1.05", "1.08"]));
        history
    }

    #[test]
    fn test_build_complete_set() {
        let set = IndicatorSet::build(&full_settings(), &history()).unwrap();
        assert!(IndicatorRole::ALL.iter().all(|role| set.get(*role).is_some()));
        assert_eq!(set.get(IndicatorRole::Price).unwrap().last(), Some(dec!(1.15)));
    }

    #[test]
    fn test_missing_role_rejected() {
        let mut settings = full_settings();
        settings.retain(|s| s.role != IndicatorRole::Daily);

        let err = IndicatorSet::build(&settings, &history()).unwrap_err();
        assert!(err.to_string().contains("daily"));
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let mut settings = full_settings();
        settings.push(settings[0].clone());
        assert!(matches!(
            IndicatorSet::build(&settings, &history()),
            Err(BotError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_snapshot_keeps_last_two() {
        let set = IndicatorSet::build(&full_settings(), &history()).unwrap();
        let snapshot = set.snapshot();

        assert_eq!(
            snapshot.last_two(IndicatorRole::Price),
            Some((dec!(1.14), dec!(1.15)))
        );
        assert_eq!(snapshot.values(IndicatorRole::Slow).len(), 2);
        assert_eq!(snapshot.latest(IndicatorRole::Daily), Some(dec!(1.065)));
    }

    #[test]
    fn test_update_routes_by_granularity() {
        let mut set = IndicatorSet::build(&full_settings(), &history()).unwrap();

        let mut latest = history();
        latest
            .get_mut(&Granularity::M30)
            .unwrap()
            .push(candle_at(6, dec!(1.16)));

        // five M30 indicators each gain one value, daily is untouched
        assert_eq!(set.update(&latest).unwrap(), 5);
        assert_eq!(set.get(IndicatorRole::Daily).unwrap().values().len(), 2);
        assert_eq!(set.snapshot().latest(IndicatorRole::Price), Some(dec!(1.16)));
    }
}
