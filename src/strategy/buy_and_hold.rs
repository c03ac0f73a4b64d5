use serde::{Deserialize, Serialize};

use super::{ensure_feed, Strategy, StrategyState, TradeLog, TradeLogBuilder};
use crate::models::{DailyRecord, ExitReason, PositionSide, TradeAction};
use crate::pnl::compound_capital;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuyAndHoldParams {
    pub initial_capital: f64,
}

impl Default for BuyAndHoldParams {
    fn default() -> Self {
        Self {
            initial_capital: 10000.0,
        }
    }
}

/// Buy-and-Hold baseline strategy
///
/// Used as the benchmark every classifier-driven strategy is compared against.
///
/// Strategy:
/// - Buy with all capital at the first close in the feed
/// - Ignore every prediction
/// - Sell at the last close (only when the feed has more than one record)
#[derive(Debug, Clone)]
pub struct BuyAndHoldStrategy {
    params: BuyAndHoldParams,
    state: StrategyState,
}

impl BuyAndHoldStrategy {
    pub fn new(params: BuyAndHoldParams) -> Self {
        let state = StrategyState::new(params.initial_capital);
        Self { params, state }
    }
}

impl Default for BuyAndHoldStrategy {
    fn default() -> Self {
        Self::new(BuyAndHoldParams::default())
    }
}

impl Strategy for BuyAndHoldStrategy {
    fn name(&self) -> &str {
        "BuyAndHold"
    }

    fn reset(&mut self) {
        self.state = StrategyState::new(self.params.initial_capital);
    }

    fn run(&mut self, ticker: &str, feed: &[DailyRecord]) -> Result<TradeLog> {
        self.reset();
        ensure_feed(ticker, feed)?;

        let mut log = TradeLogBuilder::new(self.name(), ticker, self.params.initial_capital);

        // ensure_feed rejects empty feeds
        let (first, last) = match (feed.first(), feed.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(log.finish(self.params.initial_capital)),
        };

        self.state
            .enter(PositionSide::Long, first.date, first.close, 1.0);
        log.record_open(first.date, TradeAction::Buy, first.close, 100.0);

        if feed.len() > 1 {
            let change = self.state.change_at(last.close);
            log.record_close(
                last.date,
                TradeAction::Sell,
                last.close,
                change,
                ExitReason::EndOfFeed,
            );
            self.state.exit();
        }

        let final_capital = compound_capital(self.params.initial_capital, log.changes());
        self.state.capital = final_capital;

        tracing::info!(
            "BuyAndHold on {}: {:.2} -> {:.2}, final capital {:.2}",
            ticker,
            first.close,
            last.close,
            final_capital
        );

        Ok(log.finish(final_capital))
    }

    fn state(&self) -> &StrategyState {
        &self.state
    }
}
