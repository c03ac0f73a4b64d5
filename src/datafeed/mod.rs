// Daily market + classifier data feeds
pub mod validator;

use std::collections::HashMap;

use crate::error::BacktestError;
use crate::models::{DailyRecord, FeedRequest};
use crate::Result;

pub use validator::{FeedIssue, FeedValidator};

/// Source of classifier-annotated daily records
///
/// Implementations return records ordered by date ascending and fail with
/// `NotFound` when the request matches nothing, or `Data` when the joined rows
/// are malformed.
#[allow(async_fn_in_trait)]
pub trait DataFeed {
    async fn fetch(&self, request: &FeedRequest) -> Result<Vec<DailyRecord>>;
}

/// Reject empty feeds as `NotFound` and structurally broken ones as `Data`
pub fn check_fetched(request: &FeedRequest, records: &[DailyRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(BacktestError::NotFound {
            ticker: request.ticker.clone(),
            model: request.model.clone(),
            feature_set: request.feature_set.clone(),
        });
    }

    FeedValidator::new()
        .validate(records)
        .map_err(|issue| BacktestError::Data(format!("{}: {}", request.ticker, issue)))
}

/// Feed backed by records held in memory (tests, synthetic runs, replays)
///
/// Feeds are stored under their full history; a request's start date filters
/// on the way out.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataFeed {
    feeds: HashMap<FeedRequest, Vec<DailyRecord>>,
}

impl InMemoryDataFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: FeedRequest, records: Vec<DailyRecord>) {
        self.feeds.insert(request.with_start_date(None), records);
    }

    pub fn with_feed(mut self, request: FeedRequest, records: Vec<DailyRecord>) -> Self {
        self.insert(request, records);
        self
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

impl DataFeed for InMemoryDataFeed {
    async fn fetch(&self, request: &FeedRequest) -> Result<Vec<DailyRecord>> {
        let key = request.clone().with_start_date(None);
        let records: Vec<DailyRecord> = self
            .feeds
            .get(&key)
            .map(|feed| {
                feed.iter()
                    .filter(|r| request.includes(r.date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        check_fetched(request, &records)?;

        tracing::debug!(
            "Served {} in-memory records for {}",
            records.len(),
            request.ticker
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketCondition;
    use chrono::NaiveDate;

    fn records(n: u32) -> Vec<DailyRecord> {
        (1..=n)
            .map(|d| {
                DailyRecord::new(
                    NaiveDate::from_ymd_opt(2023, 1, d).unwrap(),
                    100.0,
                    100.0 + d as f64,
                    MarketCondition::Sideways,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_known_request() {
        let request = FeedRequest::new("MSFT", "CNNv0", "raw");
        let feed = InMemoryDataFeed::new().with_feed(request.clone(), records(5));

        let fetched = feed.fetch(&request).await.unwrap();
        assert_eq!(fetched.len(), 5);
        assert_eq!(fetched[0].close, 101.0);
    }

    #[tokio::test]
    async fn test_unknown_request_is_not_found() {
        let feed = InMemoryDataFeed::new();
        let result = feed.fetch(&FeedRequest::new("IBM", "CNNv0", "raw")).await;
        assert!(matches!(result, Err(BacktestError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_model_is_part_of_the_key() {
        let request = FeedRequest::new("MSFT", "CNNv0", "raw");
        let feed = InMemoryDataFeed::new().with_feed(request, records(3));

        let result = feed.fetch(&FeedRequest::new("MSFT", "LSTMv1", "raw")).await;
        assert!(matches!(result, Err(BacktestError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_start_date_trims_history() {
        let feed = InMemoryDataFeed::new()
            .with_feed(FeedRequest::new("MSFT", "CNNv0", "raw"), records(5));

        let from_third = FeedRequest::new("MSFT", "CNNv0", "raw")
            .with_start_date(NaiveDate::from_ymd_opt(2023, 1, 3));
        let fetched = feed.fetch(&from_third).await.unwrap();
        assert_eq!(fetched.len(), 3);
        assert_eq!(fetched[0].date, NaiveDate::from_ymd_opt(2023, 1, 3).unwrap());

        let too_late = FeedRequest::new("MSFT", "CNNv0", "raw")
            .with_start_date(NaiveDate::from_ymd_opt(2024, 1, 1));
        let result = feed.fetch(&too_late).await;
        assert!(matches!(result, Err(BacktestError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_malformed_feed_is_data_error() {
        let request = FeedRequest::new("MSFT", "CNNv0", "raw");
        let mut broken = records(3);
        broken.swap(0, 2);
        let feed = InMemoryDataFeed::new().with_feed(request.clone(), broken);

        let result = feed.fetch(&request).await;
        assert!(matches!(result, Err(BacktestError::Data(_))));
    }
}
