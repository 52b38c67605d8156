use chrono::{TimeZone, Utc};
use fxbot::backtest::{AccountSummary, PaperSession, SessionSettings};
use fxbot::{BotError, Result, StrategyConfig};
use rust_decimal_macros::dec;

/// One simulated week of one-minute steps
const STEPS: usize = 7 * 24 * 60;
const STEP_SECS: i64 = 60;
const SEEDS: [u64; 5] = [1, 7, 42, 1234, 99_999];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("fxbot=warn")
        .init();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║            FXBOT SYNTHETIC PAPER RUNS                ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let config = StrategyConfig::load(None)?;
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| BotError::InvalidArgument("invalid start date".to_string()))?;

    let mut results = Vec::new();
    for seed in SEEDS {
        let mut session = PaperSession::start(
            &config,
            SessionSettings {
                seed,
                start,
                start_price: dec!(1.10000),
                balance: dec!(10000),
                leverage: dec!(50),
                history_bars: config.initial_candles_quantity,
            },
        )
        .await?;

        let mut cycles = 0;
        for _ in 0..STEPS {
            match session.step(STEP_SECS).await {
                Ok(true) => cycles += 1,
                Ok(false) => {}
                Err(e) => eprintln!("❌ seed {}: cycle failed: {}", seed, e),
            }
        }

        results.push((seed, cycles, session.summary().await?));
    }

    print_summary(&results);
    Ok(())
}

fn print_summary(results: &[(u64, usize, AccountSummary)]) {
    println!(
        "\n{:<8} {:>8} {:>12} {:>8} {:>8} {:>8}",
        "Seed", "Cycles", "Balance", "Trades", "Orders", "Calls"
    );
    println!("{}", "─".repeat(58));

    for (seed, cycles, summary) in results {
        println!(
            "{:<8} {:>8} {:>12} {:>8} {:>8} {:>8}",
            seed,
            cycles,
            summary.balance.round_dp(2),
            summary.open_trades,
            summary.pending_orders,
            summary.broker_calls
        );
    }
}
