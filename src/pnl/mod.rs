use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::LogicWarning;
use crate::models::{TradeAction, TradeRecord};

/// Holdings at or below this are treated as empty
const HOLDINGS_EPSILON: f64 = 1e-12;

/// Compound a starting capital over realized percentage changes, in order
///
/// # Example
/// ```
/// use trendbot::pnl::compound_capital;
///
/// let capital = compound_capital(10000.0, &[0.10, -0.05]);
/// assert!((capital - 10450.0).abs() < 1e-9);
/// ```
pub fn compound_capital(initial_capital: f64, changes: &[f64]) -> f64 {
    changes
        .iter()
        .fold(initial_capital, |capital, change| capital * (1.0 + change))
}

/// Result of replaying a trade log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PnlReport {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub realized_pnl: f64,
    pub warnings: Vec<LogicWarning>,
}

/// A trade as it comes back from storage: the action is not yet decoded
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrade {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: String,
    pub price: f64,
    pub portion: f64,
}

/// Running capital and per-ticker holdings while a log is replayed
#[derive(Debug, Clone)]
pub struct PnlLedger {
    initial_capital: f64,
    capital: f64,
    holdings: HashMap<String, f64>,
    warnings: Vec<LogicWarning>,
}

impl PnlLedger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            capital: initial_capital,
            holdings: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn holdings(&self, ticker: &str) -> f64 {
        self.holdings.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn apply(&mut self, trade: &TradeRecord) {
        self.apply_action(
            trade.date,
            &trade.ticker,
            trade.action,
            trade.price,
            trade.portion,
        );
    }

    /// Apply a stored trade, skipping it with a warning if its action is unknown
    /// or its price is unusable
    pub fn apply_raw(&mut self, trade: &RawTrade) {
        match trade.action.parse::<TradeAction>() {
            Ok(action) => {
                self.apply_action(trade.date, &trade.ticker, action, trade.price, trade.portion)
            }
            Err(_) => self.warn(LogicWarning::UnrecognizedAction {
                ticker: trade.ticker.clone(),
                date: trade.date,
                action: trade.action.clone(),
            }),
        }
    }

    fn apply_action(
        &mut self,
        date: NaiveDate,
        ticker: &str,
        action: TradeAction,
        price: f64,
        portion: f64,
    ) {
        if !(price.is_finite() && price > 0.0) {
            self.warn(LogicWarning::InvalidPrice {
                ticker: ticker.to_string(),
                date,
                price,
            });
            return;
        }

        let fraction = portion / 100.0;

        match action {
            TradeAction::Buy => {
                let buy_amount = self.capital * fraction;
                let shares_bought = buy_amount / price;
                self.capital -= buy_amount;
                *self.holdings.entry(ticker.to_string()).or_insert(0.0) += shares_bought;

                tracing::debug!(
                    "PnL replay: BUY {} {:.4} @ {:.2} (capital {:.2})",
                    ticker,
                    shares_bought,
                    price,
                    self.capital
                );
            }
            TradeAction::Sell => {
                let held = self.holdings(ticker);
                if held <= HOLDINGS_EPSILON {
                    self.warn(LogicWarning::InsufficientHoldings {
                        ticker: ticker.to_string(),
                        date,
                    });
                    return;
                }

                let shares_sold = held * fraction;
                let sell_amount = shares_sold * price;
                self.holdings.insert(ticker.to_string(), held - shares_sold);
                self.capital += sell_amount;

                tracing::debug!(
                    "PnL replay: SELL {} {:.4} @ {:.2} (capital {:.2})",
                    ticker,
                    shares_sold,
                    price,
                    self.capital
                );
            }
        }
    }

    fn warn(&mut self, warning: LogicWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn finish(self) -> PnlReport {
        PnlReport {
            initial_capital: self.initial_capital,
            final_capital: self.capital,
            realized_pnl: self.capital - self.initial_capital,
            warnings: self.warnings,
        }
    }
}

/// Replay a trade log against a starting capital
pub fn calculate_pnl(initial_capital: f64, trades: &[TradeRecord]) -> PnlReport {
    let mut ledger = PnlLedger::new(initial_capital);
    for trade in trades {
        ledger.apply(trade);
    }
    ledger.finish()
}

/// True when every ticker in a stored log opens with a SELL, i.e. the log
/// came from a short strategy and cannot be replayed as long positions
pub fn opens_short(trades: &[RawTrade]) -> bool {
    let mut first_actions: HashMap<&str, &str> = HashMap::new();
    for trade in trades {
        first_actions
            .entry(trade.ticker.as_str())
            .or_insert(trade.action.as_str());
    }

    !first_actions.is_empty()
        && first_actions
            .values()
            .all(|action| matches!(action.parse::<TradeAction>(), Ok(TradeAction::Sell)))
}

/// Replay trades loaded from storage
pub fn calculate_pnl_from_raw(initial_capital: f64, trades: &[RawTrade]) -> PnlReport {
    let mut ledger = PnlLedger::new(initial_capital);
    for trade in trades {
        ledger.apply_raw(trade);
    }
    ledger.finish()
}
