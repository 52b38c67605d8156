// Market data collection and position management
pub mod candle_aggregator;
pub mod exit;
pub mod market_data;
pub mod position_manager;
pub mod price_feed;

pub use candle_aggregator::{AggregatorSettings, CandleAggregator};
pub use exit::{
    build_exit_strategy, exit_strategy_names, ExitBar, ExitPhase, ExitSettings, ExitState,
    ExitStrategy, HalfCloseTrailingExit,
};
pub use market_data::MarketData;
pub use position_manager::{CycleAction, PositionManager};
pub use price_feed::{IndicatorUpdater, PriceFeed, PriceObserver};
