use chrono::NaiveDate;
use sqlx::{postgres::PgRow, PgPool, Row};

use super::TradeLogSink;
use crate::datafeed::{check_fetched, DataFeed};
use crate::error::BacktestError;
use crate::models::{
    ClassProbabilities, DailyRecord, FeedRequest, MarketCondition, TradeRecord,
};
use crate::pnl::RawTrade;
use crate::Result;

/// One row of the classifier/market join, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRow {
    pub report_date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub predicted_label: i32,
    pub uptrend_prob: Option<f64>,
    pub side_prob: Option<f64>,
    pub downtrend_prob: Option<f64>,
    pub confidence: Option<f64>,
}

impl FeedRow {
    fn from_row(row: &PgRow) -> Result<Self> {
        Ok(Self {
            report_date: row.try_get("report_date")?,
            open: row.try_get("open")?,
            close: row.try_get("close")?,
            predicted_label: row.try_get("predicted_label")?,
            uptrend_prob: row.try_get("uptrend_prob")?,
            side_prob: row.try_get("side_prob")?,
            downtrend_prob: row.try_get("downtrend_prob")?,
            confidence: row.try_get("confidence")?,
        })
    }

    /// Decode into a daily record
    ///
    /// A classifier row without a matching market row has no prices and is a
    /// data error. Probabilities are kept only when all three are present.
    pub fn into_record(self, ticker: &str) -> Result<DailyRecord> {
        let (open, close) = match (self.open, self.close) {
            (Some(open), Some(close)) => (open, close),
            _ => {
                return Err(BacktestError::Data(format!(
                    "{}: no market data for classifier result on {}",
                    ticker, self.report_date
                )))
            }
        };

        let prediction = MarketCondition::try_from(self.predicted_label)?;
        let mut record = DailyRecord::new(self.report_date, open, close, prediction);

        if let (Some(u), Some(s), Some(d)) =
            (self.uptrend_prob, self.side_prob, self.downtrend_prob)
        {
            record = record.with_probabilities(ClassProbabilities::new(u, s, d));
        }
        if let Some(confidence) = self.confidence {
            record = record.with_confidence(confidence);
        }

        Ok(record)
    }
}

/// Classifier results joined with market prices by (report_date, ticker)
#[derive(Debug, Clone)]
pub struct PostgresDataFeed {
    pool: PgPool,
}

impl PostgresDataFeed {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DataFeed for PostgresDataFeed {
    async fn fetch(&self, request: &FeedRequest) -> Result<Vec<DailyRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT c.report_date,
                   m.open::float8 AS open,
                   m.close::float8 AS close,
                   c.predicted_label::int4 AS predicted_label,
                   c.uptrend_prob::float8 AS uptrend_prob,
                   c.side_prob::float8 AS side_prob,
                   c.downtrend_prob::float8 AS downtrend_prob,
                   c.confidence::float8 AS confidence
            FROM fyp.classifier_result c
            LEFT JOIN fyp.market_data m
                   ON m.report_date = c.report_date AND m.ticker = c.ticker
            WHERE c.ticker = $1 AND c.model = $2 AND c.feature_set = $3
              AND ($4::date IS NULL OR c.report_date >= $4)
            ORDER BY c.report_date ASC
            "#,
        )
        .bind(&request.ticker)
        .bind(&request.model)
        .bind(&request.feature_set)
        .bind(request.start_date)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(|row| FeedRow::from_row(row)?.into_record(&request.ticker))
            .collect::<Result<Vec<_>>>()?;

        check_fetched(request, &records)?;

        tracing::debug!(
            "Fetched {} records for {} ({} / {})",
            records.len(),
            request.ticker,
            request.model,
            request.feature_set
        );

        Ok(records)
    }
}

/// Trade logs stored in the `trade_log` table
#[derive(Debug, Clone)]
pub struct PostgresTradeLog {
    pool: PgPool,
}

impl PostgresTradeLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Load a persisted log in trade order, for replay through the PnL ledger
    pub async fn load_trade_log(
        &self,
        strategy: &str,
        ticker: Option<&str>,
    ) -> Result<Vec<RawTrade>> {
        let rows = sqlx::query(
            r#"
            SELECT report_date, ticker, action, price, amount
            FROM trade_log
            WHERE strategy = $1 AND ($2::text IS NULL OR ticker = $2)
            ORDER BY report_date ASC, id ASC
            "#,
        )
        .bind(strategy)
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in rows {
            trades.push(RawTrade {
                date: row.try_get("report_date")?,
                ticker: row.try_get("ticker")?,
                action: row.try_get("action")?,
                price: row.try_get("price")?,
                portion: row.try_get("amount")?,
            });
        }

        tracing::info!("Loaded {} trades for strategy {}", trades.len(), strategy);

        Ok(trades)
    }
}

impl TradeLogSink for PostgresTradeLog {
    async fn persist(&self, strategy: &str, trades: &[TradeRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        // A new run replaces whatever an earlier run stored for the same tickers
        let mut tickers: Vec<&str> = trades.iter().map(|t| t.ticker.as_str()).collect();
        tickers.sort_unstable();
        tickers.dedup();
        for ticker in tickers {
            sqlx::query("DELETE FROM trade_log WHERE strategy = $1 AND ticker = $2")
                .bind(strategy)
                .bind(ticker)
                .execute(&mut *tx)
                .await?;
        }

        for trade in trades {
            let note = trade.reason.as_ref().map(|r| r.to_string());

            sqlx::query(
                r#"
                INSERT INTO trade_log (
                    report_date, ticker, strategy, action, price, amount,
                    percentage_change, note
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (strategy, ticker, report_date, action) DO UPDATE SET
                    price = EXCLUDED.price,
                    amount = EXCLUDED.amount,
                    percentage_change = EXCLUDED.percentage_change,
                    note = EXCLUDED.note
                "#,
            )
            .bind(trade.date)
            .bind(&trade.ticker)
            .bind(strategy)
            .bind(trade.action.as_str())
            .bind(trade.price)
            .bind(trade.portion)
            .bind(trade.percentage_change)
            .bind(note)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!("Persisted {} trades for {}", trades.len(), strategy);

        Ok(trades.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> FeedRow {
        FeedRow {
            report_date: NaiveDate::from_ymd_opt(2012, 4, 2).unwrap(),
            open: Some(30.1),
            close: Some(30.7),
            predicted_label: 2,
            uptrend_prob: Some(0.1),
            side_prob: Some(0.2),
            downtrend_prob: Some(0.7),
            confidence: None,
        }
    }

    #[test]
    fn test_row_decodes_label_and_probabilities() {
        let record = row().into_record("CSCO").unwrap();

        assert_eq!(record.prediction, MarketCondition::Downtrend);
        assert_eq!(record.close, 30.7);
        assert_eq!(record.probabilities, Some(ClassProbabilities::new(0.1, 0.2, 0.7)));
        assert_eq!(record.confidence(), Some(0.7));
    }

    #[test]
    fn test_missing_market_row_is_data_error() {
        let result = FeedRow { close: None, ..row() }.into_record("CSCO");
        assert!(matches!(result, Err(BacktestError::Data(_))));
    }

    #[test]
    fn test_unknown_label_is_data_error() {
        let result = FeedRow {
            predicted_label: 7,
            ..row()
        }
        .into_record("CSCO");
        assert!(matches!(result, Err(BacktestError::Data(_))));
    }

    #[test]
    fn test_partial_probabilities_dropped() {
        let record = FeedRow {
            side_prob: None,
            confidence: Some(0.55),
            ..row()
        }
        .into_record("CSCO")
        .unwrap();

        assert!(record.probabilities.is_none());
        assert_eq!(record.confidence(), Some(0.55));
    }
}
