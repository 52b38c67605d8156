use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::BrokerGateway;
use crate::models::{Candle, Granularity};
use crate::Result;

/// How much to fetch and how long to keep it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    pub initial_quantity: usize,
    pub update_quantity: usize,
    pub retry_interval: Duration,
    /// Maximum number of candles to keep
    pub max_candles: usize,
}

/// Rolling, duplicate-free history of completed candles for one
/// instrument and granularity
///
/// Bars are tracked by close time. Once a tick arrives past the time the
/// next bar is due to complete, the aggregator polls the feed until that
/// bar shows up, sleeping `retry_interval` between attempts. The wait is
/// unbounded; cancel it by dropping the future.
pub struct CandleAggregator {
    gateway: Arc<dyn BrokerGateway>,
    instrument: String,
    granularity: Granularity,
    settings: AggregatorSettings,
    candles: VecDeque<Candle>,
}

impl CandleAggregator {
    pub fn new(
        gateway: Arc<dyn BrokerGateway>,
        instrument: &str,
        granularity: Granularity,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            gateway,
            instrument: instrument.to_string(),
            granularity,
            settings,
            candles: VecDeque::new(),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Snapshot of the stored history, oldest first
    pub fn candles(&self) -> Vec<Candle> {
        self.candles.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Close time of the newest stored bar
    pub fn last_close_time(&self) -> Option<DateTime<Utc>> {
        self.candles.back().map(Candle::close_time)
    }

    /// Load the initial history. Returns the number of candles kept.
    pub async fn bootstrap(&mut self) -> Result<usize> {
        let fetched = self.fetch(self.settings.initial_quantity).await?;
        self.candles.clear();
        let appended = self.append(fetched);

        tracing::info!(
            instrument = %self.instrument,
            granularity = %self.granularity,
            candles = appended,
            "Candle history bootstrapped"
        );

        Ok(appended)
    }

    /// Pull in any bar completed before `tick_time`.
    /// Returns true when at least one new bar was appended.
    pub async fn update(&mut self, tick_time: DateTime<Utc>) -> Result<bool> {
        let Some(last_close) = self.last_close_time() else {
            let fetched = self.fetch(self.settings.update_quantity).await?;
            return Ok(self.append(fetched) > 0);
        };

        let next_close = last_close + self.granularity.duration();
        if tick_time <= next_close {
            return Ok(false);
        }

        loop {
            let fetched = self.fetch(self.settings.update_quantity).await?;
            let appended = self.append(fetched);
            if appended > 0 {
                tracing::debug!(
                    instrument = %self.instrument,
                    granularity = %self.granularity,
                    appended,
                    "New candles appended"
                );
                return Ok(true);
            }

            tracing::debug!(
                instrument = %self.instrument,
                granularity = %self.granularity,
                "Feed has no new bar yet, retrying"
            );
            tokio::time::sleep(self.settings.retry_interval).await;
        }
    }

    /// Fetch from the gateway, retrying transient failures
    async fn fetch(&self, quantity: usize) -> Result<Vec<Candle>> {
        loop {
            match self
                .gateway
                .candles(&self.instrument, quantity, self.granularity)
                .await
            {
                Ok(candles) => return Ok(candles),
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        instrument = %self.instrument,
                        granularity = %self.granularity,
                        error = %e,
                        "Candle fetch failed, retrying"
                    );
                    tokio::time::sleep(self.settings.retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Append complete bars strictly newer than the stored ones
    fn append(&mut self, mut fetched: Vec<Candle>) -> usize {
        fetched.retain(Candle::is_complete);
        fetched.sort_by_key(Candle::time);

        let mut appended = 0;
        for candle in fetched {
            let newer = self
                .candles
                .back()
                .map_or(true, |last| candle.time() > last.time());
            if newer {
                self.candles.push_back(candle);
                appended += 1;
            }
        }

        while self.candles.len() > self.settings.max_candles {
            self.candles.pop_front();
        }

        appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PaperBroker;
    use crate::models::Ohlc;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn settings(max_candles: usize) -> AggregatorSettings {
        AggregatorSettings {
            initial_quantity: 10,
            update_quantity: 3,
            retry_interval: Duration::from_millis(1),
            max_candles,
        }
    }

    fn minute(index: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_040 + index * 60, 0).unwrap()
    }

    fn bar(index: i64, close: Decimal) -> Candle {
        Candle::completed(minute(index), Ohlc::flat(close), 10, Granularity::M1).unwrap()
    }

    fn forming(index: i64) -> Candle {
        Candle::new(minute(index), Ohlc::flat(dec!(1.2)), 1, 60, false).unwrap()
    }

    fn broker_with(count: i64) -> Arc<PaperBroker> {
        let broker = Arc::new(PaperBroker::new("EUR_USD", dec!(1000), dec!(50)));
        for i in 0..count {
            broker.publish_candle(Granularity::M1, bar(i, dec!(1.1))).unwrap();
        }
        broker
    }

    fn aggregator(broker: &Arc<PaperBroker>, max_candles: usize) -> CandleAggregator {
        CandleAggregator::new(broker.clone(), "EUR_USD", Granularity::M1, settings(max_candles))
    }

    #[tokio::test]
    async fn test_bootstrap_drops_forming_bar() {
        let broker = broker_with(4);
        broker.publish_candle(Granularity::M1, forming(4)).unwrap();

        let mut aggregator = aggregator(&broker, 100);
        assert_eq!(aggregator.bootstrap().await.unwrap(), 4);
        assert_eq!(aggregator.last_close_time(), Some(minute(4)));
    }

    #[tokio::test]
    async fn test_update_before_boundary_does_nothing() {
        let broker = broker_with(3);
        let mut aggregator = aggregator(&broker, 100);
        aggregator.bootstrap().await.unwrap();

        // last bar closes at minute(3); the next one is due at minute(4)
        assert!(!aggregator.update(minute(4)).await.unwrap());
        assert_eq!(aggregator.len(), 3);
    }

    #[tokio::test]
    async fn test_update_appends_new_bar() {
        let broker = broker_with(3);
        let mut aggregator = aggregator(&broker, 100);
        aggregator.bootstrap().await.unwrap();

        broker.publish_candle(Granularity::M1, bar(3, dec!(1.2))).unwrap();
        broker.publish_candle(Granularity::M1, forming(4)).unwrap();

        assert!(aggregator.update(minute(4) + chrono::Duration::seconds(1)).await.unwrap());
        let candles = aggregator.candles();
        assert_eq!(candles.len(), 4);
        assert_eq!(candles[3].close(), dec!(1.2));
    }

    #[tokio::test]
    async fn test_refeed_is_idempotent() {
        let broker = broker_with(5);
        let mut aggregator = aggregator(&broker, 100);
        aggregator.bootstrap().await.unwrap();
        let before = aggregator.candles();

        assert_eq!(aggregator.append(vec![bar(4, dec!(9.9)), bar(2, dec!(9.9))]), 0);
        assert_eq!(aggregator.candles(), before);
    }

    #[tokio::test]
    async fn test_update_waits_for_stale_feed() {
        let broker = broker_with(3);
        let mut aggregator = aggregator(&broker, 100);
        aggregator.bootstrap().await.unwrap();

        let publisher = broker.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish_candle(Granularity::M1, bar(3, dec!(1.3))).unwrap();
        });

        assert!(aggregator.update(minute(5)).await.unwrap());
        assert_eq!(aggregator.candles()[3].close(), dec!(1.3));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_failures_leave_history_intact() {
        let broker = broker_with(3);
        let mut aggregator = aggregator(&broker, 100);
        aggregator.bootstrap().await.unwrap();

        broker.publish_candle(Granularity::M1, bar(3, dec!(1.3))).unwrap();
        broker.fail_next_fetches(3).unwrap();

        assert!(aggregator.update(minute(5)).await.unwrap());
        assert_eq!(aggregator.len(), 4);
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let broker = broker_with(8);
        let mut aggregator = aggregator(&broker, 5);
        assert_eq!(aggregator.bootstrap().await.unwrap(), 8);

        let candles = aggregator.candles();
        assert_eq!(candles.len(), 5);
        assert_eq!(candles[0].time(), minute(3));
    }
}
