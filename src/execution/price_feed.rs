use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use super::market_data::MarketData;
use crate::api::BrokerGateway;
use crate::models::Price;
use crate::Result;

/// Something that reacts to new prices
#[async_trait]
pub trait PriceObserver: Send + Sync {
    fn name(&self) -> &str;

    async fn on_price(&self, price: &Price) -> Result<()>;
}

type ObserverList = Arc<Vec<Arc<dyn PriceObserver>>>;

/// Polls the current price and fans it out to observers
///
/// Observers run one after another in registration order, only for a
/// tradable quote that differs from the last one delivered. The observer
/// list is copy-on-write so it can change while a notification pass runs.
pub struct PriceFeed {
    gateway: Arc<dyn BrokerGateway>,
    instrument: String,
    poll_interval: Duration,
    observers: RwLock<ObserverList>,
    last_notified: Mutex<Option<Price>>,
}

impl PriceFeed {
    pub fn new(gateway: Arc<dyn BrokerGateway>, instrument: &str, poll_interval: Duration) -> Self {
        Self {
            gateway,
            instrument: instrument.to_string(),
            poll_interval,
            observers: RwLock::new(Arc::new(Vec::new())),
            last_notified: Mutex::new(None),
        }
    }

    /// Current observers, unaffected by later (un)registrations
    pub fn observers(&self) -> ObserverList {
        match self.observers.read() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_observers(&self, update: impl FnOnce(&mut Vec<Arc<dyn PriceObserver>>)) {
        let mut guard = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = guard.as_ref().clone();
        update(&mut next);
        *guard = Arc::new(next);
    }

    pub fn register(&self, observer: Arc<dyn PriceObserver>) {
        tracing::debug!(observer = observer.name(), "Observer registered");
        self.replace_observers(|list| list.push(observer));
    }

    /// Remove every observer called `name`. Returns true if one was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut removed = false;
        self.replace_observers(|list| {
            let before = list.len();
            list.retain(|o| o.name() != name);
            removed = list.len() != before;
        });
        removed
    }

    /// Deliver `price` if it is tradable and new.
    /// Returns true when the observers were notified.
    pub async fn notify(&self, price: &Price) -> Result<bool> {
        if !price.is_tradable() {
            return Ok(false);
        }
        {
            let mut last = self.last_notified.lock().await;
            if last.as_ref().is_some_and(|l| l.same_quote(price)) {
                return Ok(false);
            }
            *last = Some(price.clone());
        }

        for observer in self.observers().iter() {
            if let Err(e) = observer.on_price(price).await {
                tracing::error!(
                    observer = observer.name(),
                    instrument = %self.instrument,
                    error = %e,
                    "Observer failed, cycle aborted"
                );
                return Err(e);
            }
        }
        Ok(true)
    }

    /// Fetch the current price once and notify
    pub async fn poll_once(&self) -> Result<bool> {
        let price = self.gateway.current_price(&self.instrument).await?;
        self.notify(&price).await
    }

    /// Poll until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            instrument = %self.instrument,
            interval_ms = self.poll_interval.as_millis() as u64,
            observers = self.observers().len(),
            "Price feed started"
        );

        loop {
            // the whole pass races shutdown, so a stalled candle wait is dropped too
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(instrument = %self.instrument, "Price feed stopped");
                    return;
                }
                _ = async {
                    ticker.tick().await;
                    self.poll_logged().await;
                } => {}
            }
        }
    }

    async fn poll_logged(&self) {
        match self.gateway.current_price(&self.instrument).await {
            Ok(price) => {
                // observer failures are logged by notify
                let _ = self.notify(&price).await;
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(instrument = %self.instrument, error = %e, "Price fetch failed");
            }
            Err(e) => {
                tracing::error!(instrument = %self.instrument, error = %e, "Price fetch rejected");
            }
        }
    }
}

/// Advances candle histories and indicators on every new price
pub struct IndicatorUpdater {
    market: Arc<Mutex<MarketData>>,
}

impl IndicatorUpdater {
    pub fn new(market: Arc<Mutex<MarketData>>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl PriceObserver for IndicatorUpdater {
    fn name(&self) -> &str {
        "indicator-updater"
    }

    async fn on_price(&self, price: &Price) -> Result<()> {
        self.market.lock().await.advance(price.time()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PaperBroker;
    use crate::execution::{AggregatorSettings, CandleAggregator};
    use crate::models::{Candle, Granularity, Ohlc};
    use crate::BotError;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    /// Records which observer saw which bid, in delivery order
    struct Recorder {
        name: String,
        seen: Arc<StdMutex<Vec<(String, Decimal)>>>,
        fail: bool,
    }

    #[async_trait]
    impl PriceObserver for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_price(&self, price: &Price) -> Result<()> {
            self.seen.lock().unwrap().push((self.name.clone(), price.bid()));
            if self.fail {
                return Err(BotError::Broker("rejected".into()));
            }
            Ok(())
        }
    }

    fn recorder(
        name: &str,
        seen: &Arc<StdMutex<Vec<(String, Decimal)>>>,
        fail: bool,
    ) -> Arc<dyn PriceObserver> {
        Arc::new(Recorder {
            name: name.to_string(),
            seen: seen.clone(),
            fail,
        })
    }

    fn price(second: i64, bid: Decimal, tradable: bool) -> Price {
        let time = Utc.timestamp_opt(1_700_000_000 + second, 0).unwrap();
        Price::new(time, bid + dec!(0.0002), bid, tradable, 1_000_000).unwrap()
    }

    fn feed() -> PriceFeed {
        let broker = Arc::new(PaperBroker::new("EUR_USD", dec!(1000), dec!(50)));
        PriceFeed::new(broker, "EUR_USD", Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_notifies_in_registration_order() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let feed = feed();
        feed.register(recorder("first", &seen, false));
        feed.register(recorder("second", &seen, false));

        assert!(feed.notify(&price(0, dec!(1.1), true)).await.unwrap());
        let names: Vec<String> = seen.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_skips_repeated_and_untradable_quotes() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let feed = feed();
        feed.register(recorder("only", &seen, false));

        assert!(feed.notify(&price(0, dec!(1.1), true)).await.unwrap());
        // same quote, later timestamp
        assert!(!feed.notify(&price(5, dec!(1.1), true)).await.unwrap());
        assert!(!feed.notify(&price(6, dec!(1.2), false)).await.unwrap());
        assert!(feed.notify(&price(7, dec!(1.2), true)).await.unwrap());

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_observer_error_ends_cycle() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let feed = feed();
        feed.register(recorder("broken", &seen, true));
        feed.register(recorder("after", &seen, false));

        assert!(feed.notify(&price(0, dec!(1.1), true)).await.is_err());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unregister() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let feed = feed();
        feed.register(recorder("a", &seen, false));
        let snapshot = feed.observers();

        assert!(feed.unregister("a"));
        assert!(!feed.unregister("a"));
        assert!(feed.observers().is_empty());
        // a pass already holding the old list still sees the observer
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let broker = Arc::new(PaperBroker::new("EUR_USD", dec!(1000), dec!(50)));
        broker.publish_price(price(0, dec!(1.1), true)).unwrap();
        broker.fail_next_fetches(1).unwrap();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let feed = PriceFeed::new(broker, "EUR_USD", Duration::from_millis(2));
        feed.register(recorder("only", &seen, false));

        feed.run(tokio::time::sleep(Duration::from_millis(50))).await;
        // first poll fails transiently, the quote is then delivered once
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    /// Waits for a bar the feed never publishes
    struct StalledCandles {
        aggregator: Mutex<CandleAggregator>,
        tick: chrono::DateTime<Utc>,
    }

    #[async_trait]
    impl PriceObserver for StalledCandles {
        fn name(&self) -> &str {
            "stalled-candles"
        }

        async fn on_price(&self, _price: &Price) -> Result<()> {
            self.aggregator.lock().await.update(self.tick).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_candle_wait() {
        let broker = Arc::new(PaperBroker::new("EUR_USD", dec!(1000), dec!(50)));
        for i in 0..3 {
            let time = Utc.timestamp_opt(1_700_000_040 + i * 60, 0).unwrap();
            let candle = Candle::completed(time, Ohlc::flat(dec!(1.1)), 1, Granularity::M1).unwrap();
            broker.publish_candle(Granularity::M1, candle).unwrap();
        }
        broker.publish_price(price(0, dec!(1.1), true)).unwrap();

        let mut aggregator = CandleAggregator::new(
            broker.clone(),
            "EUR_USD",
            Granularity::M1,
            AggregatorSettings {
                initial_quantity: 10,
                update_quantity: 3,
                retry_interval: Duration::from_millis(5),
                max_candles: 100,
            },
        );
        aggregator.bootstrap().await.unwrap();
        let last_close = aggregator.last_close_time().unwrap();

        let feed = PriceFeed::new(broker, "EUR_USD", Duration::from_millis(2));
        feed.register(Arc::new(StalledCandles {
            aggregator: Mutex::new(aggregator),
            tick: last_close + chrono::Duration::minutes(10),
        }));

        let stopped = tokio::time::timeout(
            Duration::from_secs(2),
            feed.run(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await;
        assert!(stopped.is_ok(), "shutdown did not end the candle wait");
    }
}
