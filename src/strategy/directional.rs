use serde::{Deserialize, Serialize};

use super::{
    ensure_feed, should_force_close, DayAction, StrategyState, TradeLog, TradeLogBuilder,
};
use crate::models::{DailyRecord, ExitReason, MarketCondition, PositionSide, TradeAction};
use crate::pnl::compound_capital;
use crate::Result;

/// Parameters shared by the long-only and short-only counter strategies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectionalParams {
    pub initial_capital: f64,
    /// Consecutive non-confirming days before a forced exit
    pub sell_counter_threshold: u32,
    /// Maximum tolerated adverse move, as a negative fraction
    pub stop_loss_percentage: f64,
    /// Maximum days a single entry signal stays valid
    pub holding_period: u32,
}

impl Default for DirectionalParams {
    fn default() -> Self {
        Self {
            initial_capital: 10000.0,
            sell_counter_threshold: 3,
            stop_loss_percentage: -0.05,
            holding_period: 20,
        }
    }
}

/// Single-position state machine that follows one classifier label
///
/// Long-only follows `Uptrend`, short-only follows `Downtrend`. The position is
/// always 100% of capital and returns compound across round trips.
#[derive(Debug, Clone)]
pub(crate) struct DirectionalCore {
    params: DirectionalParams,
    side: PositionSide,
    state: StrategyState,
}

impl DirectionalCore {
    pub(crate) fn new(params: DirectionalParams, side: PositionSide) -> Self {
        let state = StrategyState::new(params.initial_capital);
        Self {
            params,
            side,
            state,
        }
    }

    pub(crate) fn params(&self) -> &DirectionalParams {
        &self.params
    }

    pub(crate) fn state(&self) -> &StrategyState {
        &self.state
    }

    pub(crate) fn reset(&mut self) {
        self.state = StrategyState::new(self.params.initial_capital);
    }

    fn signal(&self) -> MarketCondition {
        match self.side {
            PositionSide::Short => MarketCondition::Downtrend,
            _ => MarketCondition::Uptrend,
        }
    }

    fn opening_action(&self) -> TradeAction {
        match self.side {
            PositionSide::Short => TradeAction::Sell,
            _ => TradeAction::Buy,
        }
    }

    fn closing_action(&self) -> TradeAction {
        match self.side {
            PositionSide::Short => TradeAction::Buy,
            _ => TradeAction::Sell,
        }
    }

    /// One day's transition.
    ///
    /// Precedence: entry, then counter update, then stop-loss, then sell counter.
    /// At most one of them produces a trade.
    pub(crate) fn step(
        &self,
        mut state: StrategyState,
        record: &DailyRecord,
    ) -> (StrategyState, DayAction) {
        let params = &self.params;
        let confirming = record.prediction == self.signal();

        if state.is_flat() {
            if confirming {
                state.enter(self.side, record.date, record.close, 1.0);
                return (state, DayAction::Enter { portion: 100.0 });
            }
            return (state, DayAction::Hold);
        }

        // Once the holding period is used up the signal has expired and further
        // confirming days count against the position.
        if confirming && state.days_held < params.holding_period {
            state.days_held += 1;
            state.non_confirming_days = 0;
            if state.days_held == params.holding_period {
                state.non_confirming_days = params.sell_counter_threshold.saturating_sub(1);
            }
        } else {
            state.non_confirming_days += 1;
        }

        let change = state.change_at(record.close);
        if change <= params.stop_loss_percentage {
            state.exit();
            return (
                state,
                DayAction::Exit {
                    change,
                    reason: ExitReason::StopLoss { change },
                },
            );
        }

        if state.non_confirming_days >= params.sell_counter_threshold {
            state.exit();
            return (
                state,
                DayAction::Exit {
                    change,
                    reason: ExitReason::SellCounter,
                },
            );
        }

        (state, DayAction::Hold)
    }

    pub(crate) fn run(
        &mut self,
        name: &str,
        ticker: &str,
        feed: &[DailyRecord],
    ) -> Result<TradeLog> {
        self.reset();
        ensure_feed(ticker, feed)?;

        let mut log = TradeLogBuilder::new(name, ticker, self.params.initial_capital);

        for record in feed {
            let (next, action) = self.step(self.state, record);
            self.state = next;

            match action {
                DayAction::Hold => {}
                DayAction::Enter { portion } => {
                    log.record_open(record.date, self.opening_action(), record.close, portion)
                }
                DayAction::Exit { change, reason } => log.record_close(
                    record.date,
                    self.closing_action(),
                    record.close,
                    change,
                    reason,
                ),
            }
        }

        if let Some(last) = feed.last() {
            if should_force_close(&self.state, last) {
                let change = self.state.change_at(last.close);
                log.record_close(
                    last.date,
                    self.closing_action(),
                    last.close,
                    change,
                    ExitReason::EndOfFeed,
                );
                self.state.exit();
            }
        }

        let final_capital = compound_capital(self.params.initial_capital, log.changes());
        self.state.capital = final_capital;

        tracing::info!(
            "{} on {}: {} trades, final capital {:.2}",
            name,
            ticker,
            log.changes().len(),
            final_capital
        );

        Ok(log.finish(final_capital))
    }
}
