use serde::Serialize;

use super::metrics::TradeStats;
use crate::pnl::PnlReport;
use crate::strategy::TradeLog;

/// Everything produced by one strategy on one ticker
#[derive(Debug, Clone, Serialize)]
pub struct StrategyRun {
    pub log: TradeLog,
    /// Trade-log replay through the PnL ledger, `None` for short books
    pub replay: Option<PnlReport>,
    pub stats: TradeStats,
}

impl StrategyRun {
    /// Realized PnL used for comparisons
    pub fn pnl(&self) -> f64 {
        self.log.realized_pnl()
    }
}

/// Target vs benchmark on one ticker
#[derive(Debug, Clone, Serialize)]
pub struct TickerComparison {
    pub ticker: String,
    pub target: StrategyRun,
    pub benchmark: StrategyRun,
}

impl TickerComparison {
    /// The target must strictly beat the benchmark
    pub fn passed(&self) -> bool {
        self.target.pnl() > self.benchmark.pnl()
    }

    pub fn status(&self) -> &'static str {
        if self.passed() {
            "PASS"
        } else {
            "FAIL"
        }
    }

    /// `[PASS] AAPL   | BAH:      1234.56 | TARGET:      2345.67`, colored
    pub fn format_line(&self) -> String {
        let color = if self.passed() { "92m" } else { "91m" };
        format!(
            "\x1b[{}[{}]\x1b[0m {:6} | BAH: {:12.2} | TARGET: {:12.2}",
            color,
            self.status(),
            self.ticker,
            self.benchmark.pnl(),
            self.target.pnl()
        )
    }
}

/// A ticker that could not be evaluated
#[derive(Debug, Clone, Serialize)]
pub struct TickerFailure {
    pub ticker: String,
    pub error: String,
}

/// Outcome of a run over many tickers
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub comparisons: Vec<TickerComparison>,
    pub failures: Vec<TickerFailure>,
}

impl BatchReport {
    pub fn passed(&self) -> usize {
        self.comparisons.iter().filter(|c| c.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.comparisons.len() - self.passed()
    }

    pub fn total_target_pnl(&self) -> f64 {
        self.comparisons.iter().map(|c| c.target.pnl()).sum()
    }

    pub fn total_benchmark_pnl(&self) -> f64 {
        self.comparisons.iter().map(|c| c.benchmark.pnl()).sum()
    }

    pub fn print_summary(&self) {
        println!();
        println!(
            "{} PASS / {} FAIL / {} errors",
            self.passed(),
            self.failed(),
            self.failures.len()
        );
        println!(
            "Total PnL | BAH: {:.2} | TARGET: {:.2}",
            self.total_benchmark_pnl(),
            self.total_target_pnl()
        );
        for failure in &self.failures {
            println!("  {} skipped: {}", failure.ticker, failure.error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pnl::calculate_pnl;

    fn run(final_capital: f64) -> StrategyRun {
        let log = TradeLog {
            strategy: "Test".to_string(),
            ticker: "KO".to_string(),
            initial_capital: 10000.0,
            final_capital,
            trades: vec![],
            percentage_changes: vec![],
        };
        StrategyRun {
            replay: Some(calculate_pnl(10000.0, &log.trades)),
            stats: TradeStats::from_log(&log),
            log,
        }
    }

    fn comparison(target: f64, benchmark: f64) -> TickerComparison {
        TickerComparison {
            ticker: "KO".to_string(),
            target: run(target),
            benchmark: run(benchmark),
        }
    }

    #[test]
    fn test_pass_requires_strictly_better_target() {
        assert!(comparison(10500.0, 10400.0).passed());
        assert!(!comparison(10400.0, 10400.0).passed());
        assert!(!comparison(9000.0, 10400.0).passed());
    }

    #[test]
    fn test_line_format() {
        let line = comparison(10500.0, 10400.0).format_line();
        assert!(line.contains("[PASS]"));
        assert!(line.contains("KO     | BAH:       400.00 | TARGET:       500.00"));
    }

    #[test]
    fn test_batch_totals() {
        let report = BatchReport {
            comparisons: vec![comparison(10500.0, 10400.0), comparison(9000.0, 11000.0)],
            failures: vec![TickerFailure {
                ticker: "UTX".to_string(),
                error: "no data".to_string(),
            }],
        };

        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert!((report.total_target_pnl() + 500.0).abs() < 1e-9);
        assert!((report.total_benchmark_pnl() - 1400.0).abs() < 1e-9);
    }
}
