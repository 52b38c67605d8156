use std::path::PathBuf;

use anyhow::Context;
use chrono::{DurationRound, Utc};
use clap::Parser;
use fxbot::backtest::{PaperSession, SessionSettings};
use fxbot::{BrokerGateway, StrategyConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Paper-trade the crossover strategy against a synthetic market
#[derive(Debug, Parser)]
#[command(name = "fxbot", version)]
struct Args {
    /// TOML strategy configuration; FXBOT__* variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the synthetic market
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Simulated seconds the market advances per poll
    #[arg(long, default_value_t = 60)]
    step_secs: i64,

    /// Starting account balance
    #[arg(long, default_value_t = dec!(10000))]
    balance: Decimal,

    /// Account leverage
    #[arg(long, default_value_t = dec!(50))]
    leverage: Decimal,

    /// Starting mid price
    #[arg(long, default_value_t = dec!(1.10000))]
    start_price: Decimal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config =
        StrategyConfig::load(args.config.as_deref()).context("failed to load strategy config")?;

    tracing::info!("🚀 fxbot starting (paper trading)");
    tracing::info!(
        "📊 Configuration: {}",
        serde_json::to_string(&config).context("failed to render config")?
    );

    let start = Utc::now()
        .duration_trunc(chrono::Duration::days(1))
        .context("failed to align start time")?;
    let history_bars = config.initial_candles_quantity;
    let session = PaperSession::start(
        &config,
        SessionSettings {
            seed: args.seed,
            start,
            start_price: args.start_price,
            balance: args.balance,
            leverage: args.leverage,
            history_bars,
        },
    )
    .await?;

    let feed = session.feed();
    let broker = session.broker().clone();
    let market_task = session.spawn_market(config.poll_interval(), args.step_secs);

    tracing::info!("Press Ctrl+C to stop...");
    feed.run(async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for Ctrl+C, running until killed");
            std::future::pending::<()>().await;
        }
        tracing::info!("⚠️  Received Ctrl+C, shutting down...");
    })
    .await;

    market_task.abort();

    tracing::info!(
        balance = %broker.balance().await?,
        broker_calls = broker.journal()?.len(),
        "👋 fxbot stopped"
    );
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fxbot=info")),
        )
        .init();
}
