use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BacktestError;

/// Classifier-predicted market condition for a ticker/day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MarketCondition {
    Uptrend,
    Sideways,
    Downtrend,
}

impl MarketCondition {
    pub const ALL: [MarketCondition; 3] = [
        MarketCondition::Uptrend,
        MarketCondition::Sideways,
        MarketCondition::Downtrend,
    ];

    /// Label code as stored by the classifier
    pub fn code(self) -> i32 {
        match self {
            MarketCondition::Uptrend => 0,
            MarketCondition::Sideways => 1,
            MarketCondition::Downtrend => 2,
        }
    }
}

impl TryFrom<i32> for MarketCondition {
    type Error = BacktestError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MarketCondition::Uptrend),
            1 => Ok(MarketCondition::Sideways),
            2 => Ok(MarketCondition::Downtrend),
            other => Err(BacktestError::Data(format!(
                "unknown predicted label code: {}",
                other
            ))),
        }
    }
}

/// Per-class probabilities emitted by the classifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassProbabilities {
    pub uptrend: f64,
    pub sideways: f64,
    pub downtrend: f64,
}

impl ClassProbabilities {
    pub fn new(uptrend: f64, sideways: f64, downtrend: f64) -> Self {
        Self {
            uptrend,
            sideways,
            downtrend,
        }
    }

    /// Certain prediction of a single label
    pub fn one_hot(label: MarketCondition) -> Self {
        match label {
            MarketCondition::Uptrend => Self::new(1.0, 0.0, 0.0),
            MarketCondition::Sideways => Self::new(0.0, 1.0, 0.0),
            MarketCondition::Downtrend => Self::new(0.0, 0.0, 1.0),
        }
    }

    pub fn get(&self, label: MarketCondition) -> f64 {
        match label {
            MarketCondition::Uptrend => self.uptrend,
            MarketCondition::Sideways => self.sideways,
            MarketCondition::Downtrend => self.downtrend,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.uptrend, self.sideways, self.downtrend]
    }

    /// Most likely label. Ties resolve in Uptrend, Sideways, Downtrend order.
    pub fn most_likely(&self) -> MarketCondition {
        let mut best = MarketCondition::Uptrend;
        for label in MarketCondition::ALL {
            if self.get(label) > self.get(best) {
                best = label;
            }
        }
        best
    }
}

/// One trading day of joined market + classifier data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub prediction: MarketCondition,
    pub probabilities: Option<ClassProbabilities>,
    pub confidence: Option<f64>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate, open: f64, close: f64, prediction: MarketCondition) -> Self {
        Self {
            date,
            open,
            close,
            prediction,
            probabilities: None,
            confidence: None,
        }
    }

    pub fn with_probabilities(mut self, probabilities: ClassProbabilities) -> Self {
        self.probabilities = Some(probabilities);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Probabilities if the classifier reported them, otherwise a one-hot of the label
    pub fn probabilities_or_label(&self) -> ClassProbabilities {
        self.probabilities
            .unwrap_or_else(|| ClassProbabilities::one_hot(self.prediction))
    }

    /// Confidence in the predicted label.
    ///
    /// Falls back to the predicted label's probability when no scalar
    /// confidence was reported.
    pub fn confidence(&self) -> Option<f64> {
        self.confidence
            .or_else(|| self.probabilities.map(|p| p.get(self.prediction)))
    }
}

/// Identifies one feed: a ticker scored by a given model on a given feature set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FeedRequest {
    pub ticker: String,
    pub model: String,
    pub feature_set: String,
    /// Earliest report date to include, none means the whole history
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

impl FeedRequest {
    pub fn new(ticker: &str, model: &str, feature_set: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            model: model.to_string(),
            feature_set: feature_set.to_string(),
            start_date: None,
        }
    }

    pub fn with_start_date(mut self, start_date: Option<NaiveDate>) -> Self {
        self.start_date = start_date;
        self
    }

    /// Whether a record dated `date` falls inside the requested range
    pub fn includes(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Which way the simulator is currently exposed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            other => Err(format!("unknown trade action: {}", other)),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExitReason {
    StopLoss { change: f64 },
    TrailingStop { change: f64 },
    SellCounter,
    Confidence { confidence: f64 },
    Decision,
    EndOfFeed,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss { change } => {
                write!(f, "Stop loss triggered at {:.2}%", change * 100.0)
            }
            ExitReason::TrailingStop { change } => {
                write!(f, "Trailing stop triggered at {:.2}%", change * 100.0)
            }
            ExitReason::SellCounter => f.write_str("Sell counter threshold reached"),
            ExitReason::Confidence { confidence } => write!(
                f,
                "Confidence-based exit ({:.0}% non-uptrend confidence)",
                confidence * 100.0
            ),
            ExitReason::Decision => f.write_str("Decision function signalled exit"),
            ExitReason::EndOfFeed => f.write_str("Position closed at end of feed"),
        }
    }
}

/// One trade event in a strategy's log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: TradeAction,
    pub price: f64,
    /// Percent (0-100) of capital for an opening trade, of the held position
    /// for a closing one
    pub portion: f64,
    pub percentage_change: Option<f64>,
    pub reason: Option<ExitReason>,
}

impl TradeRecord {
    /// Trade that opens a position
    pub fn open(
        date: NaiveDate,
        ticker: &str,
        action: TradeAction,
        price: f64,
        portion: f64,
    ) -> Self {
        Self {
            date,
            ticker: ticker.to_string(),
            action,
            price,
            portion,
            percentage_change: None,
            reason: None,
        }
    }

    /// Trade that closes the whole position
    pub fn close(
        date: NaiveDate,
        ticker: &str,
        action: TradeAction,
        price: f64,
        percentage_change: f64,
        reason: ExitReason,
    ) -> Self {
        Self {
            date,
            ticker: ticker.to_string(),
            action,
            price,
            portion: 100.0,
            percentage_change: Some(percentage_change),
            reason: Some(reason),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.percentage_change.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, d).unwrap()
    }

    #[test]
    fn test_label_codes_decode() {
        assert_eq!(MarketCondition::try_from(0).unwrap(), MarketCondition::Uptrend);
        assert_eq!(MarketCondition::try_from(1).unwrap(), MarketCondition::Sideways);
        assert_eq!(MarketCondition::try_from(2).unwrap(), MarketCondition::Downtrend);
        assert!(MarketCondition::try_from(3).is_err());
        assert!(MarketCondition::try_from(-1).is_err());
    }

    #[test]
    fn test_most_likely_label() {
        let probs = ClassProbabilities::new(0.2, 0.3, 0.5);
        assert_eq!(probs.most_likely(), MarketCondition::Downtrend);

        // Ties keep the earlier label
        let tied = ClassProbabilities::new(0.4, 0.4, 0.2);
        assert_eq!(tied.most_likely(), MarketCondition::Uptrend);
    }

    #[test]
    fn test_confidence_fallbacks() {
        let bare = DailyRecord::new(day(1), 10.0, 11.0, MarketCondition::Sideways);
        assert_eq!(bare.confidence(), None);

        let with_probs = bare
            .clone()
            .with_probabilities(ClassProbabilities::new(0.1, 0.7, 0.2));
        assert_eq!(with_probs.confidence(), Some(0.7));

        let explicit = with_probs.with_confidence(0.9);
        assert_eq!(explicit.confidence(), Some(0.9));
    }

    #[test]
    fn test_probabilities_or_label_uses_one_hot() {
        let record = DailyRecord::new(day(2), 10.0, 11.0, MarketCondition::Downtrend);
        assert_eq!(
            record.probabilities_or_label(),
            ClassProbabilities::new(0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn test_trade_action_parse() {
        assert_eq!("BUY".parse::<TradeAction>().unwrap(), TradeAction::Buy);
        assert_eq!(" sell ".parse::<TradeAction>().unwrap(), TradeAction::Sell);
        assert!("HOLD".parse::<TradeAction>().is_err());
    }

    #[test]
    fn test_exit_reason_display() {
        let reason = ExitReason::StopLoss { change: -0.1 };
        assert_eq!(reason.to_string(), "Stop loss triggered at -10.00%");
        assert_eq!(
            ExitReason::SellCounter.to_string(),
            "Sell counter threshold reached"
        );
    }

    #[test]
    fn test_closing_trade_carries_change() {
        let opening = TradeRecord::open(day(1), "AAPL", TradeAction::Buy, 100.0, 100.0);
        let closing = TradeRecord::close(
            day(3),
            "AAPL",
            TradeAction::Sell,
            90.0,
            -0.1,
            ExitReason::StopLoss { change: -0.1 },
        );

        assert!(!opening.is_closing());
        assert!(closing.is_closing());
        assert_eq!(closing.portion, 100.0);
    }
}
