use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::strategy::TradeLog;

/// One closed position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundTrip {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub change: f64,
    pub holding_days: i64,
}

impl RoundTrip {
    /// Pair each opening trade with the closing trade that follows it
    pub fn from_log(log: &TradeLog) -> Vec<RoundTrip> {
        let mut trips = Vec::new();
        let mut entry: Option<NaiveDate> = None;

        for trade in &log.trades {
            match (trade.percentage_change, entry) {
                (None, _) => entry = Some(trade.date),
                (Some(change), Some(entry_date)) => {
                    trips.push(RoundTrip {
                        entry_date,
                        exit_date: trade.date,
                        change,
                        holding_days: (trade.date - entry_date).num_days(),
                    });
                    entry = None;
                }
                (Some(_), None) => {
                    tracing::warn!(
                        "{} {}: closing trade on {} without an entry",
                        log.strategy,
                        log.ticker,
                        trade.date
                    );
                }
            }
        }

        trips
    }
}

/// Performance statistics of a single strategy run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeStats {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return_pct: f64,

    pub closed_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    pub avg_change_pct: f64,
    pub best_change_pct: f64,
    pub worst_change_pct: f64,
    /// Sum of gains over sum of losses
    pub profit_factor: f64,

    /// Deepest fall of the compounded equity curve, in percent
    pub max_drawdown_pct: f64,
    pub avg_holding_days: f64,
    pub open_at_end: bool,
}

impl TradeStats {
    pub fn from_log(log: &TradeLog) -> Self {
        let trips = RoundTrip::from_log(log);
        let closed_trades = trips.len();
        let total_return_pct = log.total_return() * 100.0;

        if closed_trades == 0 {
            return Self {
                initial_capital: log.initial_capital,
                final_capital: log.final_capital,
                total_return_pct,
                closed_trades: 0,
                winning_trades: 0,
                losing_trades: 0,
                win_rate: 0.0,
                avg_change_pct: 0.0,
                best_change_pct: 0.0,
                worst_change_pct: 0.0,
                profit_factor: 0.0,
                max_drawdown_pct: 0.0,
                avg_holding_days: 0.0,
                open_at_end: log.has_open_position(),
            };
        }

        let changes: Vec<f64> = trips.iter().map(|t| t.change).collect();
        let winning_trades = changes.iter().filter(|c| **c > 0.0).count();
        let losing_trades = closed_trades - winning_trades;
        let win_rate = (winning_trades as f64 / closed_trades as f64) * 100.0;

        let avg_change_pct = changes.iter().sum::<f64>() / closed_trades as f64 * 100.0;
        let best_change_pct = changes.iter().cloned().fold(f64::NEG_INFINITY, f64::max) * 100.0;
        let worst_change_pct = changes.iter().cloned().fold(f64::INFINITY, f64::min) * 100.0;

        let total_wins: f64 = changes.iter().filter(|c| **c > 0.0).sum();
        let total_losses: f64 = changes.iter().filter(|c| **c <= 0.0).map(|c| c.abs()).sum();
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_holding_days =
            trips.iter().map(|t| t.holding_days).sum::<i64>() as f64 / closed_trades as f64;

        Self {
            initial_capital: log.initial_capital,
            final_capital: log.final_capital,
            total_return_pct,
            closed_trades,
            winning_trades,
            losing_trades,
            win_rate,
            avg_change_pct,
            best_change_pct,
            worst_change_pct,
            profit_factor,
            max_drawdown_pct: Self::max_drawdown_pct(&changes),
            avg_holding_days,
            open_at_end: log.has_open_position(),
        }
    }

    /// Maximum drawdown of the equity curve built by compounding `changes`
    fn max_drawdown_pct(changes: &[f64]) -> f64 {
        let mut equity = 1.0;
        let mut peak = 1.0;
        let mut max_dd: f64 = 0.0;

        for change in changes {
            equity *= 1.0 + change;
            if equity > peak {
                peak = equity;
            }
            if peak > 0.0 {
                max_dd = max_dd.max((peak - equity) / peak);
            }
        }

        max_dd * 100.0
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self, title: &str) {
        println!("\n=== {} ===", title);
        println!("  Initial Capital:       ${:.2}", self.initial_capital);
        println!("  Final Capital:         ${:.2}", self.final_capital);
        println!("  Return:                {:+.2}%", self.total_return_pct);
        println!("  Closed Trades:         {}", self.closed_trades);

        if self.closed_trades > 0 {
            println!(
                "  Winning Trades:        {} ({:.1}%)",
                self.winning_trades, self.win_rate
            );
            println!("  Losing Trades:         {}", self.losing_trades);
            println!("  Average Change:        {:+.2}%", self.avg_change_pct);
            println!(
                "  Best / Worst:          {:+.2}% / {:+.2}%",
                self.best_change_pct, self.worst_change_pct
            );
            println!("  Profit Factor:         {:.2}", self.profit_factor);
            println!("  Max Drawdown:          {:.2}%", self.max_drawdown_pct);
            println!("  Avg Holding:           {:.1} days", self.avg_holding_days);
        }

        if self.open_at_end {
            println!("  (position still open at end of feed)");
        }
    }
}
