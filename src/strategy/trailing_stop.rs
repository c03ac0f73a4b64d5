use serde::{Deserialize, Serialize};

use super::{
    ensure_feed, should_force_close, DayAction, Strategy, StrategyState, TradeLog, TradeLogBuilder,
};
use crate::models::{DailyRecord, ExitReason, MarketCondition, PositionSide, TradeAction};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrailingStopParams {
    pub initial_capital: f64,
    /// Fraction of capital put at risk between entry and the initial stop
    pub risk_per_trade: f64,
    pub sell_counter_threshold: u32,
    pub confidence_threshold_buy: f64,
    pub confidence_threshold_sell: f64,
    /// Initial stop distance from entry, as a negative fraction
    pub initial_stop_loss_pct: f64,
    /// Distance the stop trails below the peak close
    pub trailing_stop_gap: f64,
}

impl Default for TrailingStopParams {
    fn default() -> Self {
        Self {
            initial_capital: 10000.0,
            risk_per_trade: 0.02,
            sell_counter_threshold: 3,
            confidence_threshold_buy: 0.6,
            confidence_threshold_sell: 0.6,
            initial_stop_loss_pct: -0.05,
            trailing_stop_gap: 0.05,
        }
    }
}

/// Confidence-gated long strategy with risk-based sizing and a ratcheting stop
///
/// Strategy:
/// - Buy on an uptrend prediction whose confidence meets the buy threshold,
///   sized so that hitting the initial stop loses `risk_per_trade` of capital
/// - Raise the stop to `peak * (1 - trailing_stop_gap)` on every new high
/// - Sell when the close falls to the stop, on a confident non-uptrend
///   prediction, or after `sell_counter_threshold` unconfirmed days
///
/// Cash is debited at entry and credited at exit, so idle capital is never
/// exposed.
#[derive(Debug, Clone)]
pub struct TrailingStopStrategy {
    params: TrailingStopParams,
    state: StrategyState,
}

impl TrailingStopStrategy {
    pub fn new(params: TrailingStopParams) -> Self {
        let state = StrategyState::new(params.initial_capital);
        Self { params, state }
    }

    pub fn params(&self) -> &TrailingStopParams {
        &self.params
    }

    /// Units to buy with `capital` at `price`, never more than capital allows
    pub fn position_size(&self, capital: f64, price: f64) -> f64 {
        if price <= 0.0 || capital <= 0.0 {
            return 0.0;
        }
        let affordable = capital / price;
        let stop_distance = self.params.initial_stop_loss_pct.abs();
        if stop_distance == 0.0 {
            return affordable;
        }
        let sized = (capital * self.params.risk_per_trade) / (price * stop_distance);
        sized.min(affordable)
    }

    fn initial_stop(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 + self.params.initial_stop_loss_pct)
    }

    fn close_position(state: &mut StrategyState, price: f64) -> f64 {
        let change = state.change_at(price);
        state.capital += state.units * price;
        state.exit();
        change
    }

    /// One day's transition.
    ///
    /// Order: peak/stop update, stop breach, counters and confidence exit,
    /// then sell counter.
    pub(crate) fn step(
        &self,
        mut state: StrategyState,
        record: &DailyRecord,
    ) -> (StrategyState, DayAction) {
        let params = &self.params;
        let is_uptrend = record.prediction == MarketCondition::Uptrend;
        let confidence = record.confidence();
        let meets = |threshold: f64| confidence.is_some_and(|c| c >= threshold);

        if state.is_flat() {
            if !(is_uptrend && meets(params.confidence_threshold_buy)) {
                return (state, DayAction::Hold);
            }

            let units = self.position_size(state.capital, record.close);
            if units <= 0.0 {
                return (state, DayAction::Hold);
            }
            let cost = units * record.close;
            let portion = cost / state.capital * 100.0;

            state.capital -= cost;
            state.enter(PositionSide::Long, record.date, record.close, units);
            state.stop_level = self.initial_stop(record.close);
            return (state, DayAction::Enter { portion });
        }

        if record.close > state.peak_price {
            state.peak_price = record.close;
            let trailed = state.peak_price * (1.0 - params.trailing_stop_gap);
            state.stop_level = state.stop_level.max(trailed);
        }

        if record.close <= state.stop_level {
            let trailed = state.stop_level > self.initial_stop(state.entry_price);
            let change = Self::close_position(&mut state, record.close);
            let reason = if trailed {
                ExitReason::TrailingStop { change }
            } else {
                ExitReason::StopLoss { change }
            };
            return (state, DayAction::Exit { change, reason });
        }

        if is_uptrend && meets(params.confidence_threshold_buy) {
            state.non_confirming_days = 0;
            state.days_held += 1;
        } else {
            state.non_confirming_days += 1;
        }

        if !is_uptrend && meets(params.confidence_threshold_sell) {
            let confidence = confidence.unwrap_or_default();
            let change = Self::close_position(&mut state, record.close);
            return (
                state,
                DayAction::Exit {
                    change,
                    reason: ExitReason::Confidence { confidence },
                },
            );
        }

        if state.non_confirming_days >= params.sell_counter_threshold {
            let change = Self::close_position(&mut state, record.close);
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
}

impl Default for TrailingStopStrategy {
    fn default() -> Self {
        Self::new(TrailingStopParams::default())
    }
}

impl Strategy for TrailingStopStrategy {
    fn name(&self) -> &str {
        "TrailingStop"
    }

    fn reset(&mut self) {
        self.state = StrategyState::new(self.params.initial_capital);
    }

    fn run(&mut self, ticker: &str, feed: &[DailyRecord]) -> Result<TradeLog> {
        self.reset();
        ensure_feed(ticker, feed)?;

        let mut log = TradeLogBuilder::new("TrailingStop", ticker, self.params.initial_capital);

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
                let change = Self::close_position(&mut self.state, last.close);
                log.record_close(
                    last.date,
                    TradeAction::Sell,
                    last.close,
                    change,
                    ExitReason::EndOfFeed,
                );
            }
        }

        // A position opened on the last record is valued at cost
        let final_capital = self.state.capital + self.state.units * self.state.entry_price;

        tracing::info!(
            "TrailingStop on {}: {} round trips, final capital {:.2}",
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
