// Core modules
pub mod backtest;
pub mod config;
pub mod datafeed;
pub mod db;
pub mod error;
pub mod models;
pub mod persistence;
pub mod pnl;
pub mod strategy;

// Re-export commonly used types
pub use error::{BacktestError, LogicWarning};
pub use models::*;
pub use strategy::{Strategy, StrategyConfig, TradeLog};

// Error handling
pub type Result<T> = std::result::Result<T, BacktestError>;
