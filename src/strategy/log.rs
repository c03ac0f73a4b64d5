use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{ExitReason, TradeAction, TradeRecord};

/// Everything one strategy run produced for one ticker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeLog {
    pub strategy: String,
    pub ticker: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub trades: Vec<TradeRecord>,
    /// Realized change of every closed round trip, in trade order
    pub percentage_changes: Vec<f64>,
}

impl TradeLog {
    pub fn realized_pnl(&self) -> f64 {
        self.final_capital - self.initial_capital
    }

    pub fn total_return(&self) -> f64 {
        if self.initial_capital == 0.0 {
            return 0.0;
        }
        self.realized_pnl() / self.initial_capital
    }

    pub fn number_of_trades(&self) -> usize {
        self.trades.len()
    }

    /// True when the last trade opened a position that was never closed
    pub fn has_open_position(&self) -> bool {
        self.trades.last().is_some_and(|t| !t.is_closing())
    }

    /// True when the first trade is an opening SELL, i.e. the log trades short
    pub fn opens_short(&self) -> bool {
        self.trades
            .first()
            .is_some_and(|t| t.action == TradeAction::Sell && !t.is_closing())
    }

    pub fn count(&self, action: TradeAction) -> usize {
        self.trades.iter().filter(|t| t.action == action).count()
    }
}

/// Append-only builder used by strategies while walking a feed
#[derive(Debug)]
pub struct TradeLogBuilder {
    strategy: String,
    ticker: String,
    initial_capital: f64,
    trades: Vec<TradeRecord>,
    percentage_changes: Vec<f64>,
}

impl TradeLogBuilder {
    pub fn new(strategy: &str, ticker: &str, initial_capital: f64) -> Self {
        Self {
            strategy: strategy.to_string(),
            ticker: ticker.to_string(),
            initial_capital,
            trades: Vec::new(),
            percentage_changes: Vec::new(),
        }
    }

    pub fn record_open(&mut self, date: NaiveDate, action: TradeAction, price: f64, portion: f64) {
        tracing::debug!(
            "[{}] {} {} {} @ {:.2} ({:.1}%)",
            self.strategy,
            date,
            action,
            self.ticker,
            price,
            portion
        );
        self.trades
            .push(TradeRecord::open(date, &self.ticker, action, price, portion));
    }

    pub fn record_close(
        &mut self,
        date: NaiveDate,
        action: TradeAction,
        price: f64,
        change: f64,
        reason: ExitReason,
    ) {
        tracing::debug!(
            "[{}] {} {} {} @ {:.2} | {:+.2}% | {}",
            self.strategy,
            date,
            action,
            self.ticker,
            price,
            change * 100.0,
            reason
        );
        self.percentage_changes.push(change);
        self.trades.push(TradeRecord::close(
            date,
            &self.ticker,
            action,
            price,
            change,
            reason,
        ));
    }

    pub fn changes(&self) -> &[f64] {
        &self.percentage_changes
    }

    pub fn finish(self, final_capital: f64) -> TradeLog {
        TradeLog {
            strategy: self.strategy,
            ticker: self.ticker,
            initial_capital: self.initial_capital,
            final_capital,
            trades: self.trades,
            percentage_changes: self.percentage_changes,
        }
    }
}
