use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trendbot::backtest::{BacktestRunner, BatchReport};
use trendbot::config::{AppConfig, DatabaseConfig, DEFAULT_CONFIG_PATH};
use trendbot::datafeed::DataFeed;
use trendbot::db::{self, PostgresDataFeed, PostgresTradeLog};
use trendbot::persistence::{CachedDataFeed, FeedCache};
use trendbot::pnl::{calculate_pnl_from_raw, opens_short};

#[derive(Parser)]
#[command(
    name = "trendbot",
    about = "Backtest classifier-driven trading strategies against buy-and-hold"
)]
struct Cli {
    /// Path to the TOML settings file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run target and benchmark over every configured ticker
    Run {
        /// Only these tickers (defaults to the configured list)
        tickers: Vec<String>,

        /// Ignore classifier results before this date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// Read feeds straight from Postgres even if REDIS_URL is set
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Store trade logs in the trade_log table
        #[arg(long, default_value_t = false)]
        persist: bool,
    },
    /// Replay a persisted trade log through the PnL ledger
    Pnl {
        /// Strategy name the log was stored under (e.g. LongOnly)
        strategy: String,

        /// Restrict the replay to one ticker
        #[arg(long)]
        ticker: Option<String>,

        /// Starting capital (defaults to the configured initial capital)
        #[arg(long)]
        capital: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;
    let database = DatabaseConfig::from_env().context("database settings")?;

    match cli.command {
        Commands::Run {
            tickers,
            start_date,
            no_cache,
            persist,
        } => {
            if !tickers.is_empty() {
                config.tickers = tickers;
            }
            if start_date.is_some() {
                config.start_date = start_date;
            }
            run(config, database, no_cache, persist).await
        }
        Commands::Pnl {
            strategy,
            ticker,
            capital,
        } => replay(config, database, &strategy, ticker.as_deref(), capital).await,
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(
    config: AppConfig,
    database: DatabaseConfig,
    no_cache: bool,
    persist: bool,
) -> Result<()> {
    let pool = db::connect(&database.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let sink = if persist || config.persist_trades {
        let trade_log = PostgresTradeLog::new(pool.clone());
        trade_log.migrate().await.context("failed to migrate trade_log")?;
        Some(trade_log)
    } else {
        None
    };

    let cache = match (&database.redis_url, no_cache) {
        (Some(url), false) => match FeedCache::connect(url, config.cache_ttl_secs).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), reading feeds from Postgres", e);
                None
            }
        },
        _ => None,
    };

    let feed = PostgresDataFeed::new(pool);

    tracing::info!(
        "Backtesting {} tickers | model: {} | features: {}",
        config.tickers.len(),
        config.model,
        config.feature_set
    );

    let report = match cache {
        Some(cache) => run_batch(CachedDataFeed::new(feed, cache), &config, sink).await,
        None => run_batch(feed, &config, sink).await,
    };

    report.print_summary();
    Ok(())
}

async fn run_batch<F: DataFeed>(
    feed: F,
    config: &AppConfig,
    sink: Option<PostgresTradeLog>,
) -> BatchReport {
    let runner = BacktestRunner::new(
        feed,
        &config.model,
        &config.feature_set,
        &config.target,
        &config.benchmark,
    )
    .with_start_date(config.start_date);

    println!(
        "\nTARGET: {} | BENCHMARK: {}\n",
        runner.target_name(),
        runner.benchmark_name()
    );

    match sink {
        Some(sink) => runner.with_sink(sink).run_batch(&config.tickers).await,
        None => {
            let mut runner = runner;
            runner.run_batch(&config.tickers).await
        }
    }
}

async fn replay(
    config: AppConfig,
    database: DatabaseConfig,
    strategy: &str,
    ticker: Option<&str>,
    capital: Option<f64>,
) -> Result<()> {
    let pool = db::connect(&database.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let trade_log = PostgresTradeLog::new(pool);

    let trades = trade_log
        .load_trade_log(strategy, ticker)
        .await
        .with_context(|| format!("failed to load trade log for {}", strategy))?;

    if opens_short(&trades) {
        bail!(
            "{} trades short; the PnL ledger only replays long positions",
            strategy
        );
    }

    let initial_capital = capital.unwrap_or(config.initial_capital);
    let report = calculate_pnl_from_raw(initial_capital, &trades);

    println!("\n=== PnL replay: {} ===", strategy);
    println!("  Trades:                {}", trades.len());
    println!("  Initial Capital:       ${:.2}", report.initial_capital);
    println!("  Final Capital:         ${:.2}", report.final_capital);
    println!("  Realized PnL:          ${:.2}", report.realized_pnl);
    if !report.warnings.is_empty() {
        println!("  Skipped ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("    - {}", warning);
        }
    }

    Ok(())
}
