use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors. Any of these aborts the current (ticker, strategy) evaluation.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no data found for {ticker} (model: {model}, feature set: {feature_set})")]
    NotFound {
        ticker: String,
        model: String,
        feature_set: String,
    },

    #[error("data error: {0}")]
    Data(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Non-fatal problems found while replaying a trade log.
///
/// The offending trade is skipped and the replay continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum LogicWarning {
    #[error("no sufficient holdings found for {ticker} to sell on {date}")]
    InsufficientHoldings { ticker: String, date: chrono::NaiveDate },

    #[error("unexpected action type '{action}' for {ticker} on {date}")]
    UnrecognizedAction {
        ticker: String,
        date: chrono::NaiveDate,
        action: String,
    },

    #[error("invalid price {price} for {ticker} on {date}")]
    InvalidPrice {
        ticker: String,
        date: chrono::NaiveDate,
        price: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_not_found_message_names_request() {
        let err = BacktestError::NotFound {
            ticker: "CVX".to_string(),
            model: "CNNv0".to_string(),
            feature_set: "raw".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("CVX"));
        assert!(msg.contains("CNNv0"));
    }

    #[test]
    fn test_warning_display() {
        let warning = LogicWarning::InsufficientHoldings {
            ticker: "KO".to_string(),
            date: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
        };
        assert_eq!(
            warning.to_string(),
            "no sufficient holdings found for KO to sell on 2020-03-02"
        );
    }
}
