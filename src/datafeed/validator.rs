use chrono::NaiveDate;
use thiserror::Error;

use crate::models::DailyRecord;

/// Allowed drift of a probability triple's sum away from 1.0
const PROBABILITY_SUM_TOLERANCE: f64 = 0.01;

/// A structural problem with a feed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedIssue {
    #[error("feed is empty")]
    Empty,

    #[error("duplicate record for {0}")]
    DuplicateDate(NaiveDate),

    #[error("dates are not increasing: {previous} is followed by {current}")]
    OutOfOrder {
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("invalid {field} price {value} on {date}")]
    InvalidPrice {
        date: NaiveDate,
        field: &'static str,
        value: f64,
    },

    #[error("invalid class probabilities on {date}: {reason}")]
    InvalidProbabilities { date: NaiveDate, reason: String },

    #[error("invalid confidence {value} on {date}")]
    InvalidConfidence { date: NaiveDate, value: f64 },
}

/// Validates daily records for ordering and sanity
#[derive(Debug, Clone, Default)]
pub struct FeedValidator;

impl FeedValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a whole feed, stopping at the first issue
    pub fn validate(&self, records: &[DailyRecord]) -> Result<(), FeedIssue> {
        if records.is_empty() {
            return Err(FeedIssue::Empty);
        }

        for record in records {
            self.validate_record(record)?;
        }

        self.validate_ordering(records)
    }

    /// Validate a single record in isolation
    pub fn validate_record(&self, record: &DailyRecord) -> Result<(), FeedIssue> {
        self.validate_prices(record)?;
        self.validate_probabilities(record)?;

        if let Some(confidence) = record.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(FeedIssue::InvalidConfidence {
                    date: record.date,
                    value: confidence,
                });
            }
        }

        Ok(())
    }

    /// Prices must be finite and positive
    fn validate_prices(&self, record: &DailyRecord) -> Result<(), FeedIssue> {
        for (field, value) in [("open", record.open), ("close", record.close)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FeedIssue::InvalidPrice {
                    date: record.date,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }

    fn validate_probabilities(&self, record: &DailyRecord) -> Result<(), FeedIssue> {
        let Some(probs) = record.probabilities else {
            return Ok(());
        };

        let values = probs.as_array();
        if values.iter().any(|p| !p.is_finite() || *p < 0.0 || *p > 1.0) {
            return Err(FeedIssue::InvalidProbabilities {
                date: record.date,
                reason: format!("values out of [0, 1]: {:?}", values),
            });
        }

        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            return Err(FeedIssue::InvalidProbabilities {
                date: record.date,
                reason: format!("sum is {:.4}", sum),
            });
        }

        Ok(())
    }

    /// Dates must be strictly increasing
    fn validate_ordering(&self, records: &[DailyRecord]) -> Result<(), FeedIssue> {
        for window in records.windows(2) {
            let (previous, current) = (window[0].date, window[1].date);
            if current == previous {
                return Err(FeedIssue::DuplicateDate(current));
            }
            if current < previous {
                return Err(FeedIssue::OutOfOrder { previous, current });
            }
        }
        Ok(())
    }
}
