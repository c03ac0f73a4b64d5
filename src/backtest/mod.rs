pub mod metrics;
pub mod report;
pub mod runner;
pub mod synthetic;

pub use metrics::{RoundTrip, TradeStats};
pub use report::{BatchReport, StrategyRun, TickerComparison, TickerFailure};
pub use runner::{evaluate, BacktestRunner};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
