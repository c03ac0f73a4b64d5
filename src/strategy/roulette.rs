use serde::{Deserialize, Serialize};

use super::decision::{DecisionConfig, DecisionFunction, ProbabilityWindow};
use super::{
    ensure_feed, should_force_close, DayAction, Strategy, StrategyState, TradeLog, TradeLogBuilder,
};
use crate::models::{DailyRecord, ExitReason, PositionSide, Signal, TradeAction};
use crate::pnl::compound_capital;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouletteParams {
    pub initial_capital: f64,
    /// Number of most recent probability triples the decision function sees
    pub roulette_size: usize,
    pub decision: DecisionConfig,
}

impl Default for RouletteParams {
    fn default() -> Self {
        Self {
            initial_capital: 10000.0,
            roulette_size: 20,
            decision: DecisionConfig::default(),
        }
    }
}

/// Probabilistic long-only strategy
///
/// Keeps a rolling window of the classifier's probability triples and defers
/// every entry/exit to a pluggable [`DecisionFunction`]. Only a Buy opens a
/// flat position and only a Sell closes an open one.
pub struct RouletteStrategy {
    params: RouletteParams,
    decision: Box<dyn DecisionFunction>,
    window: ProbabilityWindow,
    state: StrategyState,
}

impl RouletteStrategy {
    pub fn new(params: RouletteParams) -> Self {
        let decision = params.decision.build();
        Self::with_decision(params, decision)
    }

    /// Use a decision function that has no configuration counterpart
    pub fn with_decision(params: RouletteParams, decision: Box<dyn DecisionFunction>) -> Self {
        let window = ProbabilityWindow::new(params.roulette_size);
        let state = StrategyState::new(params.initial_capital);
        Self {
            params,
            decision,
            window,
            state,
        }
    }

    pub fn decision_name(&self) -> &str {
        self.decision.name()
    }

    fn step(
        &mut self,
        mut state: StrategyState,
        record: &DailyRecord,
    ) -> (StrategyState, DayAction) {
        let today = record.probabilities_or_label();
        self.window.push(today);
        let signal = self.decision.decide(&today, &self.window);

        match (state.side, signal) {
            (PositionSide::Flat, Signal::Buy) => {
                state.enter(PositionSide::Long, record.date, record.close, 1.0);
                (state, DayAction::Enter { portion: 100.0 })
            }
            (PositionSide::Long, Signal::Sell) => {
                let change = state.change_at(record.close);
                state.exit();
                (
                    state,
                    DayAction::Exit {
                        change,
                        reason: ExitReason::Decision,
                    },
                )
            }
            _ => {
                if !state.is_flat() {
                    state.days_held += 1;
                }
                (state, DayAction::Hold)
            }
        }
    }
}

impl Default for RouletteStrategy {
    fn default() -> Self {
        Self::new(RouletteParams::default())
    }
}

impl std::fmt::Debug for RouletteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouletteStrategy")
            .field("params", &self.params)
            .field("decision", &self.decision.name())
            .field("state", &self.state)
            .finish()
    }
}

impl Strategy for RouletteStrategy {
    fn name(&self) -> &str {
        "Roulette"
    }

    fn reset(&mut self) {
        self.window.clear();
        self.decision.reset();
        self.state = StrategyState::new(self.params.initial_capital);
    }

    fn run(&mut self, ticker: &str, feed: &[DailyRecord]) -> Result<TradeLog> {
        self.reset();
        ensure_feed(ticker, feed)?;

        let mut log = TradeLogBuilder::new("Roulette", ticker, self.params.initial_capital);

        for record in feed {
            let (next, action) = self.step(self.state, record);
            self.state = next;

            match action {
                DayAction::Hold => {}
                DayAction::Enter { portion } => {
                    log.record_open(record.date, TradeAction::Buy, record.close, portion)
                }
                DayAction::Exit { change, reason } => {
                    log.record_close(record.date, TradeAction::Sell, record.close, change, reason)
                }
            }
        }

        if let Some(last) = feed.last() {
            if should_force_close(&self.state, last) {
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
        }

        let final_capital = compound_capital(self.params.initial_capital, log.changes());
        self.state.capital = final_capital;

        tracing::info!(
            "Roulette[{}] on {}: {} round trips, final capital {:.2}",
            self.decision.name(),
            ticker,
            log.changes().len(),
            final_capital
        );

        Ok(log.finish(final_capital))
    }

    fn state(&self) -> &StrategyState {
        &self.state
    }
}
