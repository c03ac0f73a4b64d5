use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{ClassProbabilities, DailyRecord, MarketCondition};

/// Days ahead the "true" label looks when scoring a day
const LABEL_HORIZON: usize = 5;
/// Forward return beyond which a day counts as trending
const TREND_BAND: f64 = 0.01;

/// Market scenario types for synthetic feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+0.4% daily average)
    Uptrend,
    /// Steady downtrend with noise (-0.4% daily average)
    Downtrend,
    /// Mean-reverting around the starting price
    Sideways,
    /// Large daily swings, no drift
    Volatile,
    /// Rally followed by a sharp sell-off
    Crash,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 5] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Sideways,
        MarketScenario::Volatile,
        MarketScenario::Crash,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "uptrend",
            MarketScenario::Downtrend => "downtrend",
            MarketScenario::Sideways => "sideways",
            MarketScenario::Volatile => "volatile",
            MarketScenario::Crash => "crash",
        }
    }
}

/// Generates classifier-annotated daily feeds for offline runs
///
/// Prices follow the scenario; each day's label is the direction of the
/// forward return, and the simulated classifier reports it with probability
/// `accuracy`, otherwise one of the other labels.
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    accuracy: f64,
    start: NaiveDate,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            accuracy: 0.7,
            start: NaiveDate::from_ymd_opt(2015, 1, 2).unwrap_or_default(),
        }
    }

    /// Share of days the simulated classifier gets right, clamped to [0, 1]
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy.clamp(0.0, 1.0);
        self
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Generate `num_days` trading days (weekends skipped)
    pub fn generate(&mut self, scenario: MarketScenario, num_days: usize) -> Vec<DailyRecord> {
        let closes = self.closes(scenario, num_days);
        let dates = trading_days(self.start, num_days);

        let mut records = Vec::with_capacity(num_days);
        let mut previous_close = self.base_price;
        for (i, (&close, date)) in closes.iter().zip(dates).enumerate() {
            let truth = true_label(&closes, i);
            let prediction = self.predict(truth);
            let probabilities = self.probabilities(prediction);

            records.push(
                DailyRecord::new(date, previous_close, close, prediction)
                    .with_probabilities(probabilities),
            );
            previous_close = close;
        }

        records
    }

    fn closes(&mut self, scenario: MarketScenario, num_days: usize) -> Vec<f64> {
        let mut closes = Vec::with_capacity(num_days);
        let mut price = self.base_price;

        for i in 0..num_days {
            let daily_return = match scenario {
                MarketScenario::Uptrend => 0.004 + self.rng.gen_range(-0.01..0.01),
                MarketScenario::Downtrend => -0.004 + self.rng.gen_range(-0.01..0.01),
                MarketScenario::Sideways => {
                    // Pull back toward the base price
                    let reversion = (self.base_price - price) / self.base_price * 0.1;
                    reversion + self.rng.gen_range(-0.01..0.01)
                }
                MarketScenario::Volatile => self.rng.gen_range(-0.05..0.05),
                MarketScenario::Crash => {
                    if i < num_days * 2 / 3 {
                        0.005 + self.rng.gen_range(-0.008..0.008)
                    } else {
                        -0.02 + self.rng.gen_range(-0.01..0.01)
                    }
                }
            };

            price = (price * (1.0 + daily_return)).max(0.01);
            closes.push(price);
        }

        closes
    }

    fn predict(&mut self, truth: MarketCondition) -> MarketCondition {
        if self.rng.gen_bool(self.accuracy) {
            return truth;
        }
        let others: Vec<MarketCondition> = MarketCondition::ALL
            .into_iter()
            .filter(|label| *label != truth)
            .collect();
        others[self.rng.gen_range(0..others.len())]
    }

    fn probabilities(&mut self, prediction: MarketCondition) -> ClassProbabilities {
        let top = self.rng.gen_range(0.5..0.9);
        let rest = 1.0 - top;
        let split = self.rng.gen_range(0.0..1.0);

        let mut values = [0.0; 3];
        let others = MarketCondition::ALL
            .iter()
            .filter(|label| **label != prediction);
        for (share, label) in [split, 1.0 - split].into_iter().zip(others) {
            values[label.code() as usize] = rest * share;
        }
        let index = prediction.code() as usize;
        values[index] = top;

        ClassProbabilities::new(values[0], values[1], values[2])
    }
}

/// Direction of the return from day `i` to `LABEL_HORIZON` days later
fn true_label(closes: &[f64], i: usize) -> MarketCondition {
    let ahead = (i + LABEL_HORIZON).min(closes.len() - 1);
    let change = (closes[ahead] - closes[i]) / closes[i];
    if change > TREND_BAND {
        MarketCondition::Uptrend
    } else if change < -TREND_BAND {
        MarketCondition::Downtrend
    } else {
        MarketCondition::Sideways
    }
}

fn trading_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut date = start;
    while days.len() < count {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(date);
        }
        date += Duration::days(1);
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datafeed::FeedValidator;

    #[test]
    fn test_same_seed_same_feed() {
        let a = SyntheticDataGenerator::new(42).generate(MarketScenario::Volatile, 120);
        let b = SyntheticDataGenerator::new(42).generate(MarketScenario::Volatile, 120);
        assert_eq!(a, b);
    }

    #[test]
    fn test_generated_feed_is_valid() {
        for scenario in MarketScenario::ALL {
            let records = SyntheticDataGenerator::new(7).generate(scenario, 250);
            assert_eq!(records.len(), 250);
            assert!(
                FeedValidator::new().validate(&records).is_ok(),
                "{} feed failed validation",
                scenario.name()
            );
        }
    }

    #[test]
    fn test_weekends_skipped() {
        let records = SyntheticDataGenerator::new(1).generate(MarketScenario::Sideways, 30);
        assert!(records
            .iter()
            .all(|r| !matches!(r.date.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn test_prediction_is_most_likely_class() {
        let records = SyntheticDataGenerator::new(3).generate(MarketScenario::Crash, 100);
        for record in records {
            let probabilities = record.probabilities.unwrap();
            let top = probabilities
                .as_array()
                .iter()
                .cloned()
                .fold(0.0, f64::max);
            assert_eq!(probabilities.get(record.prediction), top);
        }
    }

    #[test]
    fn test_perfect_classifier_matches_forward_direction() {
        let records = SyntheticDataGenerator::new(9)
            .with_accuracy(1.0)
            .generate(MarketScenario::Uptrend, 60);
        let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.prediction, true_label(&closes, i));
        }
    }
}
