// Postgres access: classifier feed and trade log storage
pub mod postgres;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::models::TradeRecord;
use crate::Result;

pub use postgres::{FeedRow, PostgresDataFeed, PostgresTradeLog};

/// Open a small connection pool
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    tracing::info!("Connected to Postgres");
    Ok(pool)
}

/// Destination for finished trade logs
///
/// A failed persist never changes the in-memory log; callers log it and move on.
#[allow(async_fn_in_trait)]
pub trait TradeLogSink {
    /// Store `trades` under `strategy`, returning how many rows were written
    async fn persist(&self, strategy: &str, trades: &[TradeRecord]) -> Result<usize>;
}

/// Sink that drops everything (offline runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TradeLogSink for NullSink {
    async fn persist(&self, _strategy: &str, _trades: &[TradeRecord]) -> Result<usize> {
        Ok(0)
    }
}
