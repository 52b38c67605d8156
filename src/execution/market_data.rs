use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::candle_aggregator::CandleAggregator;
use crate::api::BrokerGateway;
use crate::config::StrategyConfig;
use crate::indicators::{IndicatorSet, IndicatorSnapshot};
use crate::models::{Candle, Granularity};
use crate::Result;

/// Candle histories and the indicators computed from them
pub struct MarketData {
    aggregators: BTreeMap<Granularity, CandleAggregator>,
    indicators: IndicatorSet,
}

impl MarketData {
    /// Load history for every granularity the indicators and the exit
    /// strategy read, then build the indicator set from it
    pub async fn bootstrap(gateway: Arc<dyn BrokerGateway>, config: &StrategyConfig) -> Result<Self> {
        let mut aggregators = BTreeMap::new();
        for granularity in config.granularities() {
            let mut aggregator = CandleAggregator::new(
                gateway.clone(),
                &config.instrument,
                granularity,
                config.aggregator_settings(),
            );
            aggregator.bootstrap().await?;
            aggregators.insert(granularity, aggregator);
        }

        let indicators = IndicatorSet::build(&config.indicators, &Self::histories(&aggregators))?;
        tracing::info!(
            instrument = %config.instrument,
            granularities = aggregators.len(),
            "Market data ready"
        );

        Ok(Self {
            aggregators,
            indicators,
        })
    }

    fn histories(
        aggregators: &BTreeMap<Granularity, CandleAggregator>,
    ) -> HashMap<Granularity, Vec<Candle>> {
        aggregators
            .iter()
            .map(|(granularity, aggregator)| (*granularity, aggregator.candles()))
            .collect()
    }

    /// Advance every aggregator to `tick_time` and feed new bars to the
    /// indicators. Returns true when any bar was appended.
    pub async fn advance(&mut self, tick_time: DateTime<Utc>) -> Result<bool> {
        let mut appended = false;
        for aggregator in self.aggregators.values_mut() {
            appended |= aggregator.update(tick_time).await?;
        }

        if appended {
            let values = self.indicators.update(&Self::histories(&self.aggregators))?;
            tracing::debug!(values, "Indicators updated");
        }
        Ok(appended)
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        self.indicators.snapshot()
    }

    pub fn indicators(&self) -> &IndicatorSet {
        &self.indicators
    }

    /// History of one granularity; empty when it is not tracked
    pub fn candles(&self, granularity: Granularity) -> Vec<Candle> {
        self.aggregators
            .get(&granularity)
            .map(CandleAggregator::candles)
            .unwrap_or_default()
    }
}
