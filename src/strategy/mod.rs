// Entry signal generation
pub mod crossover;
pub mod geometry;

pub use crossover::{CrossoverSettings, CrossoverStrategy};
pub use geometry::{LineSegment, Point};

use crate::config::StrategyConfig;
use crate::indicators::IndicatorSnapshot;
use crate::models::Trade;
use crate::{BotError, Result};

/// Base trait for all entry strategies
pub trait EntryStrategy: Send + Sync {
    /// Get strategy name
    fn name(&self) -> &str;

    /// Candidate trade for the current indicator values.
    /// Returns the flat trade when there is nothing to do.
    fn evaluate(&self, snapshot: &IndicatorSnapshot) -> Result<Trade>;
}

type EntryConstructor = fn(&StrategyConfig) -> Box<dyn EntryStrategy>;

fn build_crossover(config: &StrategyConfig) -> Box<dyn EntryStrategy> {
    Box::new(CrossoverStrategy::new(config.crossover_settings()))
}

const ENTRY_STRATEGIES: &[(&str, EntryConstructor)] = &[("crossover", build_crossover)];

/// Names accepted by `build_entry_strategy`
pub fn entry_strategy_names() -> impl Iterator<Item = &'static str> {
    ENTRY_STRATEGIES.iter().map(|(name, _)| *name)
}

/// Look up an entry strategy by name
pub fn build_entry_strategy(name: &str, config: &StrategyConfig) -> Result<Box<dyn EntryStrategy>> {
    let wanted = name.trim().to_ascii_lowercase();
    ENTRY_STRATEGIES
        .iter()
        .find(|(key, _)| *key == wanted)
        .map(|(_, build)| build(config))
        .ok_or_else(|| BotError::unknown("entry strategy", name))
}
