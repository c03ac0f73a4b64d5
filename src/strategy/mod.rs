// Strategy engine: one state machine per policy behind a common trait
pub mod buy_and_hold;
pub mod decision;
pub mod directional;
pub mod log;
pub mod long_only;
pub mod roulette;
pub mod short_only;
pub mod state;
pub mod trailing_stop;

use serde::{Deserialize, Serialize};

use crate::datafeed::FeedValidator;
use crate::error::BacktestError;
use crate::models::{DailyRecord, ExitReason};
use crate::Result;

pub use buy_and_hold::{BuyAndHoldParams, BuyAndHoldStrategy};
pub use decision::{DecisionConfig, DecisionFunction, ProbabilityWindow};
pub use directional::DirectionalParams;
pub use log::{TradeLog, TradeLogBuilder};
pub use long_only::{LongOnlyParams, LongOnlyStrategy};
pub use roulette::{RouletteParams, RouletteStrategy};
pub use short_only::{ShortOnlyParams, ShortOnlyStrategy};
pub use state::StrategyState;
pub use trailing_stop::{TrailingStopParams, TrailingStopStrategy};

/// Base trait for all backtest strategies
pub trait Strategy: Send {
    /// Get strategy name
    fn name(&self) -> &str;

    /// Return all run state to its initial values
    fn reset(&mut self);

    /// Walk the feed for one ticker and produce its trade log.
    ///
    /// Always starts from a reset state, so consecutive runs are independent.
    fn run(&mut self, ticker: &str, feed: &[DailyRecord]) -> Result<TradeLog>;

    /// Position state as left by the last run
    fn state(&self) -> &StrategyState;
}

/// What a single day's transition did
#[derive(Debug, Clone, PartialEq)]
pub enum DayAction {
    Hold,
    Enter { portion: f64 },
    Exit { change: f64, reason: ExitReason },
}

/// Reject feeds a strategy cannot walk
pub(crate) fn ensure_feed(ticker: &str, feed: &[DailyRecord]) -> Result<()> {
    FeedValidator::new()
        .validate(feed)
        .map_err(|issue| BacktestError::InvalidInput(format!("{}: {}", ticker, issue)))
}

/// A position still open after the last record is closed at its price, unless
/// it was opened on that same record
pub(crate) fn should_force_close(state: &StrategyState, last: &DailyRecord) -> bool {
    !state.is_flat() && !state.opened_on(last.date)
}

/// Strategy selection, as read from configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    LongOnly(LongOnlyParams),
    ShortOnly(ShortOnlyParams),
    BuyAndHold(BuyAndHoldParams),
    Roulette(RouletteParams),
    TrailingStop(TrailingStopParams),
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::LongOnly(params) => Box::new(LongOnlyStrategy::new(params.clone())),
            StrategyConfig::ShortOnly(params) => Box::new(ShortOnlyStrategy::new(params.clone())),
            StrategyConfig::BuyAndHold(params) => {
                Box::new(BuyAndHoldStrategy::new(params.clone()))
            }
            StrategyConfig::Roulette(params) => Box::new(RouletteStrategy::new(params.clone())),
            StrategyConfig::TrailingStop(params) => {
                Box::new(TrailingStopStrategy::new(params.clone()))
            }
        }
    }

    pub fn initial_capital(&self) -> f64 {
        match self {
            StrategyConfig::LongOnly(p) | StrategyConfig::ShortOnly(p) => p.initial_capital,
            StrategyConfig::BuyAndHold(p) => p.initial_capital,
            StrategyConfig::Roulette(p) => p.initial_capital,
            StrategyConfig::TrailingStop(p) => p.initial_capital,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassProbabilities, MarketCondition};
    use chrono::NaiveDate;

    #[test]
    fn test_config_builds_named_strategies() {
        let configs = vec![
            (StrategyConfig::LongOnly(LongOnlyParams::default()), "LongOnly"),
            (StrategyConfig::ShortOnly(ShortOnlyParams::default()), "ShortOnly"),
            (StrategyConfig::BuyAndHold(BuyAndHoldParams::default()), "BuyAndHold"),
            (StrategyConfig::Roulette(RouletteParams::default()), "Roulette"),
            (StrategyConfig::TrailingStop(TrailingStopParams::default()), "TrailingStop"),
        ];

        for (config, name) in configs {
            assert_eq!(config.build().name(), name);
            assert_eq!(config.initial_capital(), 10000.0);
        }
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = r#"{ "kind": "long_only", "holding_period": 10 }"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();

        match config {
            StrategyConfig::LongOnly(params) => {
                assert_eq!(params.holding_period, 10);
                assert_eq!(params.sell_counter_threshold, 3);
                assert_eq!(params.stop_loss_percentage, -0.05);
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{ "kind": "martingale" }"#;
        assert!(serde_json::from_str::<StrategyConfig>(json).is_err());
    }

    #[test]
    fn test_empty_feed_is_invalid_input_for_every_variant() {
        let configs = vec![
            StrategyConfig::LongOnly(LongOnlyParams::default()),
            StrategyConfig::ShortOnly(ShortOnlyParams::default()),
            StrategyConfig::BuyAndHold(BuyAndHoldParams::default()),
            StrategyConfig::Roulette(RouletteParams::default()),
            StrategyConfig::TrailingStop(TrailingStopParams::default()),
        ];

        for config in configs {
            let mut strategy = config.build();
            let result = strategy.run("AAPL", &[]);
            assert!(
                matches!(result, Err(BacktestError::InvalidInput(_))),
                "{} accepted an empty feed",
                strategy.name()
            );
        }
    }

    #[test]
    fn test_rejected_run_still_resets_state() {
        let feed = vec![
            DailyRecord::new(
                NaiveDate::from_ymd_opt(2019, 3, 4).unwrap(),
                20.0,
                20.0,
                MarketCondition::Sideways,
            ),
            DailyRecord::new(
                NaiveDate::from_ymd_opt(2019, 3, 5).unwrap(),
                21.0,
                21.0,
                MarketCondition::Uptrend,
            )
            .with_probabilities(ClassProbabilities::new(0.9, 0.05, 0.05)),
        ];
        let configs = vec![
            StrategyConfig::LongOnly(LongOnlyParams::default()),
            StrategyConfig::ShortOnly(ShortOnlyParams::default()),
            StrategyConfig::BuyAndHold(BuyAndHoldParams::default()),
            StrategyConfig::Roulette(RouletteParams::default()),
            StrategyConfig::TrailingStop(TrailingStopParams::default()),
        ];

        for config in configs {
            let mut strategy = config.build();
            strategy.run("AAPL", &feed).unwrap();
            if matches!(config, StrategyConfig::LongOnly(_)) {
                // Entered on the last record, still open
                assert!(!strategy.state().is_flat());
            }

            assert!(strategy.run("MSFT", &[]).is_err());
            assert_eq!(
                *strategy.state(),
                StrategyState::new(config.initial_capital()),
                "{} kept state from the previous ticker",
                strategy.name()
            );
        }
    }

    #[test]
    fn test_force_close_skips_same_day_entries() {
        let last = DailyRecord::new(
            NaiveDate::from_ymd_opt(2020, 5, 4).unwrap(),
            10.0,
            10.0,
            MarketCondition::Uptrend,
        );
        let mut state = StrategyState::new(100.0);
        assert!(!should_force_close(&state, &last));

        state.enter(
            crate::models::PositionSide::Long,
            NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            9.0,
            1.0,
        );
        assert!(should_force_close(&state, &last));

        state.enter(crate::models::PositionSide::Long, last.date, 10.0, 1.0);
        assert!(!should_force_close(&state, &last));
    }
}
