use anyhow::Result;
use clap::Parser;

use trendbot::backtest::{evaluate, MarketScenario, StrategyRun, SyntheticDataGenerator};
use trendbot::strategy::{
    BuyAndHoldParams, LongOnlyParams, RouletteParams, ShortOnlyParams, StrategyConfig,
    TrailingStopParams,
};

/// Run every strategy over seeded synthetic feeds, no database needed
#[derive(Parser)]
#[command(name = "synthetic")]
struct Args {
    /// RNG seed for prices and predictions
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Trading days per scenario
    #[arg(long, default_value_t = 500)]
    days: usize,

    /// Share of days the simulated classifier labels correctly
    #[arg(long, default_value_t = 0.7)]
    accuracy: f64,

    /// Opening price of every scenario
    #[arg(long, default_value_t = 150.0)]
    base_price: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("trendbot=info")
        .init();

    let args = Args::parse();

    println!("\n=== TRENDBOT SYNTHETIC SCENARIOS ===");
    println!(
        "seed {} | {} days | classifier accuracy {:.0}%",
        args.seed,
        args.days,
        args.accuracy * 100.0
    );

    let configs = [
        StrategyConfig::BuyAndHold(BuyAndHoldParams::default()),
        StrategyConfig::LongOnly(LongOnlyParams::default()),
        StrategyConfig::ShortOnly(ShortOnlyParams::default()),
        StrategyConfig::Roulette(RouletteParams::default()),
        StrategyConfig::TrailingStop(TrailingStopParams::default()),
    ];

    let mut results: Vec<(String, StrategyRun)> = Vec::new();

    for scenario in MarketScenario::ALL {
        let feed = SyntheticDataGenerator::new(args.seed)
            .with_accuracy(args.accuracy)
            .with_base_price(args.base_price)
            .generate(scenario, args.days);

        for config in &configs {
            let mut strategy = config.build();
            match evaluate(strategy.as_mut(), "SYNTH", &feed) {
                Ok(run) => results.push((scenario.name().to_string(), run)),
                Err(e) => eprintln!("{} on {} failed: {}", strategy.name(), scenario.name(), e),
            }
        }
    }

    print_summary_comparison(&results);

    Ok(())
}

fn print_summary_comparison(results: &[(String, StrategyRun)]) {
    println!(
        "\n{:<12} {:<14} {:>12} {:>10} {:>8} {:>8} {:>8}",
        "Scenario", "Strategy", "PnL", "Return%", "Trades", "Win%", "MaxDD%"
    );
    println!("{}", "-".repeat(78));

    for (scenario, run) in results {
        println!(
            "{:<12} {:<14} {:>12.2} {:>10.2} {:>8} {:>8.1} {:>8.2}",
            scenario,
            run.log.strategy,
            run.pnl(),
            run.stats.total_return_pct,
            run.stats.closed_trades,
            run.stats.win_rate,
            run.stats.max_drawdown_pct
        );
    }

    if let Some((scenario, best)) = results
        .iter()
        .filter(|(_, run)| run.log.strategy != "BuyAndHold")
        .max_by(|a, b| a.1.pnl().total_cmp(&b.1.pnl()))
    {
        best.stats.print_report(&format!(
            "Best active run: {} on {}",
            best.log.strategy, scenario
        ));
    }
}
