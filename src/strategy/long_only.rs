use super::directional::{DirectionalCore, DirectionalParams};
use super::{Strategy, StrategyState, TradeLog};
use crate::models::{DailyRecord, PositionSide};
use crate::Result;

pub type LongOnlyParams = DirectionalParams;

/// Long-only trend follower driven by classifier predictions
///
/// Strategy:
/// - Buy with all capital when the classifier predicts an uptrend
/// - Sell on a stop-loss breach (default -5% from entry)
/// - Sell after `sell_counter_threshold` consecutive non-uptrend days
/// - An entry signal is only valid for `holding_period` days, after which the
///   position is closed on the next day
#[derive(Debug, Clone)]
pub struct LongOnlyStrategy {
    core: DirectionalCore,
}

impl LongOnlyStrategy {
    pub fn new(params: LongOnlyParams) -> Self {
        Self {
            core: DirectionalCore::new(params, PositionSide::Long),
        }
    }

    pub fn params(&self) -> &LongOnlyParams {
        self.core.params()
    }
}

impl Default for LongOnlyStrategy {
    fn default() -> Self {
        Self::new(LongOnlyParams::default())
    }
}

impl Strategy for LongOnlyStrategy {
    fn name(&self) -> &str {
        "LongOnly"
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn run(&mut self, ticker: &str, feed: &[DailyRecord]) -> Result<TradeLog> {
        self.core.run("LongOnly", ticker, feed)
    }

    fn state(&self) -> &StrategyState {
        self.core.state()
    }
}
