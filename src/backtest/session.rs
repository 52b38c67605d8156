use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::synthetic::SyntheticMarket;
use crate::api::{BrokerGateway, PaperBroker};
use crate::config::StrategyConfig;
use crate::execution::{
    build_exit_strategy, IndicatorUpdater, MarketData, PositionManager, PriceFeed,
};
use crate::risk::build_order_strategy;
use crate::strategy::build_entry_strategy;
use crate::Result;

/// Starting point of a paper-trading session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub seed: u64,
    pub start: DateTime<Utc>,
    pub start_price: Decimal,
    pub balance: Decimal,
    pub leverage: Decimal,
    /// Completed bars seeded per granularity before trading starts
    pub history_bars: usize,
}

/// Account state at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub balance: Decimal,
    pub open_trades: usize,
    pub pending_orders: usize,
    pub broker_calls: usize,
}

/// The full engine wired to a paper broker and a synthetic market
pub struct PaperSession {
    broker: Arc<PaperBroker>,
    market: SyntheticMarket,
    market_data: Arc<Mutex<MarketData>>,
    feed: Arc<PriceFeed>,
}

impl PaperSession {
    /// Seed the market, bootstrap indicators and register the observers
    pub async fn start(config: &StrategyConfig, settings: SessionSettings) -> Result<Self> {
        config.validate()?;

        let broker = Arc::new(PaperBroker::new(
            &config.instrument,
            settings.balance,
            settings.leverage,
        ));
        let gateway: Arc<dyn BrokerGateway> = broker.clone();

        let mut market = SyntheticMarket::new(
            settings.seed,
            settings.start,
            settings.start_price,
            config.spread,
            &config.granularities(),
        )?;
        market.seed_history(&broker, settings.history_bars)?;

        let market_data = Arc::new(Mutex::new(
            MarketData::bootstrap(gateway.clone(), config).await?,
        ));

        let position_manager = Arc::new(PositionManager::new(
            gateway.clone(),
            &config.instrument,
            market_data.clone(),
            build_entry_strategy(&config.entry_strategy, config)?,
            build_order_strategy(&config.order_strategy, config)?,
            build_exit_strategy(&config.exit_strategy, config)?,
            config.exit_granularity,
        ));

        let feed = Arc::new(PriceFeed::new(
            gateway,
            &config.instrument,
            config.poll_interval(),
        ));
        feed.register(Arc::new(IndicatorUpdater::new(market_data.clone())));
        feed.register(position_manager);

        tracing::info!(
            instrument = %config.instrument,
            seed = settings.seed,
            balance = %settings.balance,
            "Paper session started"
        );

        Ok(Self {
            broker,
            market,
            market_data,
            feed,
        })
    }

    pub fn broker(&self) -> &Arc<PaperBroker> {
        &self.broker
    }

    pub fn market(&mut self) -> &mut SyntheticMarket {
        &mut self.market
    }

    pub fn market_data(&self) -> &Arc<Mutex<MarketData>> {
        &self.market_data
    }

    pub fn feed(&self) -> Arc<PriceFeed> {
        self.feed.clone()
    }

    /// Move the market by `seconds` and run one notification pass.
    /// Returns true when the observers were notified.
    pub async fn step(&mut self, seconds: i64) -> Result<bool> {
        let price = self.market.step(&self.broker, seconds)?;
        self.feed.notify(&price).await
    }

    pub async fn summary(&self) -> Result<AccountSummary> {
        Ok(AccountSummary {
            balance: self.broker.balance().await?,
            open_trades: self.broker.open_trades_count().await?,
            pending_orders: self.broker.open_orders_count().await?,
            broker_calls: self.broker.journal()?.len(),
        })
    }

    /// Hand the market to a background task advancing it by `seconds`
    /// of simulated time every `every` of wall time
    pub fn spawn_market(self, every: Duration, seconds: i64) -> JoinHandle<()> {
        let Self {
            broker, mut market, ..
        } = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = market.step(&broker, seconds) {
                    tracing::error!(error = %e, "Synthetic market stopped");
                    return;
                }
            }
        })
    }
}
