use chrono::{Datelike, NaiveDate};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError};
use tokio::time::{timeout, Duration};

use crate::datafeed::{check_fetched, DataFeed};
use crate::models::{DailyRecord, FeedRequest};
use crate::Result;

/// Redis cache of fetched feeds
///
/// Each feed is a sorted set `feed:{ticker}:{model}:{feature_set}` holding JSON
/// records scored by their date, so a range read returns them in date order.
/// A request with a start date gets its own `...:from:{date}` set.
#[derive(Clone)]
pub struct FeedCache {
    conn: ConnectionManager,
    ttl_secs: Option<i64>,
}

impl FeedCache {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `ttl_secs` - Expiry applied to every stored feed, none keeps them forever
    pub async fn connect(redis_url: &str, ttl_secs: Option<i64>) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                RedisError::from((ErrorKind::IoError, "Redis connection timeout after 5 seconds"))
            })??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn, ttl_secs })
    }

    pub fn key(request: &FeedRequest) -> String {
        let key = format!(
            "feed:{}:{}:{}",
            request.ticker, request.model, request.feature_set
        );
        match request.start_date {
            Some(start) => format!("{}:from:{}", key, start),
            None => key,
        }
    }

    pub fn score(date: NaiveDate) -> f64 {
        date.num_days_from_ce() as f64
    }

    /// Replace the cached feed for `request`
    pub async fn store(&self, request: &FeedRequest, records: &[DailyRecord]) -> Result<()> {
        let key = Self::key(request);
        let mut members = Vec::with_capacity(records.len());
        for record in records {
            members.push((Self::score(record.date), serde_json::to_string(record)?));
        }

        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !members.is_empty() {
            pipe.zadd_multiple(&key, &members[..]).ignore();
        }
        if let Some(ttl) = self.ttl_secs {
            pipe.expire(&key, ttl).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        tracing::debug!("Cached {} records under {}", records.len(), key);

        Ok(())
    }

    /// Cached feed in date order, empty when nothing is cached
    pub async fn load(&self, request: &FeedRequest) -> Result<Vec<DailyRecord>> {
        let key = Self::key(request);
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.zrange(&key, 0, -1).await?;

        let mut records = Vec::with_capacity(values.len());
        for value in values {
            records.push(serde_json::from_str(&value)?);
        }

        Ok(records)
    }
}

/// Read-through cache in front of another feed
///
/// Cache failures are logged and fall back to the inner feed.
pub struct CachedDataFeed<F> {
    inner: F,
    cache: FeedCache,
}

impl<F: DataFeed> CachedDataFeed<F> {
    pub fn new(inner: F, cache: FeedCache) -> Self {
        Self { inner, cache }
    }
}

impl<F: DataFeed> DataFeed for CachedDataFeed<F> {
    async fn fetch(&self, request: &FeedRequest) -> Result<Vec<DailyRecord>> {
        match self.cache.load(request).await {
            Ok(records) if !records.is_empty() => {
                check_fetched(request, &records)?;
                tracing::debug!("Cache hit for {}", FeedCache::key(request));
                return Ok(records);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Feed cache read failed for {}: {}", request.ticker, e),
        }

        let records = self.inner.fetch(request).await?;

        if let Err(e) = self.cache.store(request, &records).await {
            tracing::warn!("Feed cache write failed for {}: {}", request.ticker, e);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_full_request() {
        let request = FeedRequest::new("AAPL", "CNNv0", "processed technical indicators (20 days)");
        assert_eq!(
            FeedCache::key(&request),
            "feed:AAPL:CNNv0:processed technical indicators (20 days)"
        );
    }

    #[test]
    fn test_start_date_gets_its_own_key() {
        let request = FeedRequest::new("KO", "CNNv0", "raw")
            .with_start_date(NaiveDate::from_ymd_opt(2007, 1, 1));
        assert_eq!(FeedCache::key(&request), "feed:KO:CNNv0:raw:from:2007-01-01");
    }

    #[test]
    fn test_scores_follow_date_order() {
        let a = NaiveDate::from_ymd_opt(2015, 12, 31).unwrap();
        let b = NaiveDate::from_ymd_opt(2016, 1, 1).unwrap();
        assert_eq!(FeedCache::score(b) - FeedCache::score(a), 1.0);
    }
}
