use chrono::NaiveDate;

use super::metrics::TradeStats;
use super::report::{BatchReport, StrategyRun, TickerComparison, TickerFailure};
use crate::datafeed::DataFeed;
use crate::db::{NullSink, TradeLogSink};
use crate::models::{DailyRecord, FeedRequest};
use crate::pnl::calculate_pnl;
use crate::strategy::{Strategy, StrategyConfig};
use crate::Result;

/// Runs a target strategy against a benchmark, ticker by ticker
///
/// Each ticker's feed is fetched once and both strategies walk it from a reset
/// state. Finished logs go to the sink; a failing sink is only logged.
pub struct BacktestRunner<F, S = NullSink> {
    feed: F,
    sink: S,
    model: String,
    feature_set: String,
    start_date: Option<NaiveDate>,
    target: Box<dyn Strategy>,
    benchmark: Box<dyn Strategy>,
}

impl<F: DataFeed> BacktestRunner<F, NullSink> {
    pub fn new(
        feed: F,
        model: &str,
        feature_set: &str,
        target: &StrategyConfig,
        benchmark: &StrategyConfig,
    ) -> Self {
        Self {
            feed,
            sink: NullSink,
            model: model.to_string(),
            feature_set: feature_set.to_string(),
            start_date: None,
            target: target.build(),
            benchmark: benchmark.build(),
        }
    }
}

impl<F: DataFeed, S: TradeLogSink> BacktestRunner<F, S> {
    /// Send finished trade logs to `sink`
    pub fn with_sink<T: TradeLogSink>(self, sink: T) -> BacktestRunner<F, T> {
        BacktestRunner {
            feed: self.feed,
            sink,
            model: self.model,
            feature_set: self.feature_set,
            start_date: self.start_date,
            target: self.target,
            benchmark: self.benchmark,
        }
    }

    /// Only evaluate records reported on or after `start_date`
    pub fn with_start_date(mut self, start_date: Option<NaiveDate>) -> Self {
        self.start_date = start_date;
        self
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    pub fn benchmark_name(&self) -> &str {
        self.benchmark.name()
    }

    /// Evaluate both strategies on one ticker
    pub async fn run_ticker(&mut self, ticker: &str) -> Result<TickerComparison> {
        let request = FeedRequest::new(ticker, &self.model, &self.feature_set)
            .with_start_date(self.start_date);
        let feed = self.feed.fetch(&request).await?;

        tracing::info!("Running {} records for {}", feed.len(), ticker);

        let target = evaluate(self.target.as_mut(), ticker, &feed)?;
        let benchmark = evaluate(self.benchmark.as_mut(), ticker, &feed)?;

        for run in [&target, &benchmark] {
            if let Err(e) = self.sink.persist(&run.log.strategy, &run.log.trades).await {
                tracing::warn!(
                    "Failed to persist {} trades for {}: {}",
                    run.log.strategy,
                    ticker,
                    e
                );
            }
        }

        Ok(TickerComparison {
            ticker: ticker.to_string(),
            target,
            benchmark,
        })
    }

    /// Evaluate every ticker, continuing past per-ticker failures
    pub async fn run_batch(&mut self, tickers: &[String]) -> BatchReport {
        let mut report = BatchReport::default();

        for ticker in tickers {
            match self.run_ticker(ticker).await {
                Ok(comparison) => {
                    println!("{}", comparison.format_line());
                    report.comparisons.push(comparison);
                }
                Err(e) => {
                    tracing::error!("Skipping {}: {}", ticker, e);
                    report.failures.push(TickerFailure {
                        ticker: ticker.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Batch finished: {} evaluated, {} failed",
            report.comparisons.len(),
            report.failures.len()
        );

        report
    }
}

/// Run one strategy and derive its replay and statistics
///
/// The PnL ledger only holds long positions, so short logs are not replayed.
pub fn evaluate(
    strategy: &mut dyn Strategy,
    ticker: &str,
    feed: &[DailyRecord],
) -> Result<StrategyRun> {
    let log = strategy.run(ticker, feed)?;
    let replay = if log.opens_short() {
        tracing::debug!("{} on {} trades short, skipping ledger replay", log.strategy, ticker);
        None
    } else {
        Some(calculate_pnl(log.initial_capital, &log.trades))
    };
    let stats = TradeStats::from_log(&log);

    Ok(StrategyRun { log, replay, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datafeed::InMemoryDataFeed;
    use crate::error::BacktestError;
    use crate::models::{MarketCondition, TradeRecord};
    use crate::strategy::{BuyAndHoldParams, LongOnlyParams, ShortOnlyParams};
    use chrono::Duration;
    use std::sync::{Arc, Mutex};

    const MODEL: &str = "CNNv0";
    const FEATURES: &str = "technical";

    fn records(closes: &[(MarketCondition, f64)]) -> Vec<DailyRecord> {
        let start = NaiveDate::from_ymd_opt(2011, 2, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &(label, close))| {
                DailyRecord::new(start + Duration::days(i as i64), close, close, label)
            })
            .collect()
    }

    fn runner(feed: InMemoryDataFeed) -> BacktestRunner<InMemoryDataFeed> {
        BacktestRunner::new(
            feed,
            MODEL,
            FEATURES,
            &StrategyConfig::LongOnly(LongOnlyParams::default()),
            &StrategyConfig::BuyAndHold(BuyAndHoldParams::default()),
        )
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        persisted: Arc<Mutex<Vec<(String, usize)>>>,
    }

    impl TradeLogSink for RecordingSink {
        async fn persist(&self, strategy: &str, trades: &[TradeRecord]) -> Result<usize> {
            self.persisted
                .lock()
                .unwrap()
                .push((strategy.to_string(), trades.len()));
            Ok(trades.len())
        }
    }

    struct FailingSink;

    impl TradeLogSink for FailingSink {
        async fn persist(&self, _strategy: &str, _trades: &[TradeRecord]) -> Result<usize> {
            Err(BacktestError::Data("sink offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_run_ticker_compares_target_and_benchmark() {
        use MarketCondition::*;
        let feed = InMemoryDataFeed::new().with_feed(
            FeedRequest::new("AAPL", MODEL, FEATURES),
            records(&[(Uptrend, 100.0), (Uptrend, 110.0), (Downtrend, 90.0), (Sideways, 120.0)]),
        );

        let mut runner = runner(feed);
        let comparison = runner.run_ticker("AAPL").await.unwrap();

        // Long-only stops out at -10%, buy-and-hold gains 20%
        assert!((comparison.target.pnl() + 1000.0).abs() < 1e-9);
        assert!((comparison.benchmark.pnl() - 2000.0).abs() < 1e-9);
        assert!(!comparison.passed());
        let replay = comparison.benchmark.replay.as_ref().unwrap();
        assert!((replay.final_capital - 12000.0).abs() < 1e-9);
        assert!(replay.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_batch_continues_past_missing_ticker() {
        use MarketCondition::*;
        let feed = InMemoryDataFeed::new().with_feed(
            FeedRequest::new("KO", MODEL, FEATURES),
            records(&[(Sideways, 40.0), (Uptrend, 41.0), (Uptrend, 44.0)]),
        );

        let mut runner = runner(feed);
        let tickers = vec!["MISSING".to_string(), "KO".to_string()];
        let report = runner.run_batch(&tickers).await;

        assert_eq!(report.comparisons.len(), 1);
        assert_eq!(report.comparisons[0].ticker, "KO");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].ticker, "MISSING");
    }

    #[tokio::test]
    async fn test_sink_receives_both_logs() {
        use MarketCondition::*;
        let feed = InMemoryDataFeed::new().with_feed(
            FeedRequest::new("HD", MODEL, FEATURES),
            records(&[(Uptrend, 10.0), (Sideways, 11.0), (Sideways, 12.0)]),
        );
        let sink = RecordingSink::default();
        let persisted = sink.persisted.clone();

        let mut runner = runner(feed).with_sink(sink);
        runner.run_ticker("HD").await.unwrap();

        let persisted = persisted.lock().unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].0, "LongOnly");
        assert_eq!(persisted[1].0, "BuyAndHold");
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_ticker() {
        use MarketCondition::*;
        let feed = InMemoryDataFeed::new().with_feed(
            FeedRequest::new("GE", MODEL, FEATURES),
            records(&[(Uptrend, 10.0), (Uptrend, 12.0)]),
        );

        let mut runner = runner(feed).with_sink(FailingSink);
        let comparison = runner.run_ticker("GE").await.unwrap();
        assert_eq!(comparison.target.log.trades.len(), 2);
    }

    #[tokio::test]
    async fn test_start_date_limits_both_runs() {
        use MarketCondition::*;
        let feed = InMemoryDataFeed::new().with_feed(
            FeedRequest::new("MCD", MODEL, FEATURES),
            records(&[(Uptrend, 50.0), (Uptrend, 80.0), (Sideways, 100.0), (Sideways, 110.0)]),
        );

        let start = NaiveDate::from_ymd_opt(2011, 2, 3);
        let mut runner = runner(feed).with_start_date(start);
        let comparison = runner.run_ticker("MCD").await.unwrap();

        // Buy-and-hold only sees 100 -> 110
        assert_eq!(comparison.benchmark.log.trades[0].date, start.unwrap());
        assert!((comparison.benchmark.pnl() - 1000.0).abs() < 1e-9);
        assert!(comparison.target.log.trades.is_empty());
    }

    #[tokio::test]
    async fn test_short_target_is_not_replayed_as_long() {
        use MarketCondition::*;
        let feed = InMemoryDataFeed::new().with_feed(
            FeedRequest::new("INTC", MODEL, FEATURES),
            records(&[
                (Downtrend, 100.0),
                (Downtrend, 95.0),
                (Uptrend, 90.0),
                (Sideways, 90.0),
                (Uptrend, 92.0),
            ]),
        );

        let mut runner = BacktestRunner::new(
            feed,
            MODEL,
            FEATURES,
            &StrategyConfig::ShortOnly(ShortOnlyParams::default()),
            &StrategyConfig::BuyAndHold(BuyAndHoldParams::default()),
        );
        let comparison = runner.run_ticker("INTC").await.unwrap();

        // Short at 100, covered at the last close of 92
        assert!((comparison.target.pnl() - 800.0).abs() < 1e-9);
        assert!(comparison.target.log.opens_short());
        assert!(comparison.target.replay.is_none());
        assert!(comparison.benchmark.replay.is_some());
    }
}
