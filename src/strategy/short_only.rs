use super::directional::{DirectionalCore, DirectionalParams};
use super::{Strategy, StrategyState, TradeLog};
use crate::models::{DailyRecord, PositionSide};
use crate::Result;

pub type ShortOnlyParams = DirectionalParams;

/// Mirror image of the long-only strategy
///
/// Opens a short (SELL) on a downtrend prediction and covers (BUY) on a
/// stop-loss, after sustained non-downtrend predictions, or once the holding
/// period has run out. Gains are positive when the price falls.
#[derive(Debug, Clone)]
pub struct ShortOnlyStrategy {
    core: DirectionalCore,
}

impl ShortOnlyStrategy {
    pub fn new(params: ShortOnlyParams) -> Self {
        Self {
            core: DirectionalCore::new(params, PositionSide::Short),
        }
    }

    pub fn params(&self) -> &ShortOnlyParams {
        self.core.params()
    }
}

impl Default for ShortOnlyStrategy {
    fn default() -> Self {
        Self::new(ShortOnlyParams::default())
    }
}

impl Strategy for ShortOnlyStrategy {
    fn name(&self) -> &str {
        "ShortOnly"
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn run(&mut self, ticker: &str, feed: &[DailyRecord]) -> Result<TradeLog> {
        self.core.run("ShortOnly", ticker, feed)
    }

    fn state(&self) -> &StrategyState {
        self.core.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExitReason, MarketCondition, TradeAction};
    use chrono::{Duration, NaiveDate};

    use MarketCondition::{Downtrend, Sideways, Uptrend};

    fn feed(days: &[(MarketCondition, f64)]) -> Vec<DailyRecord> {
        let start = NaiveDate::from_ymd_opt(2016, 3, 1).unwrap();
        days.iter()
            .enumerate()
            .map(|(i, &(label, close))| {
                DailyRecord::new(start + Duration::days(i as i64), close, close, label)
            })
            .collect()
    }

    #[test]
    fn test_short_profits_when_price_falls() {
        let records = feed(&[
            (Downtrend, 100.0),
            (Downtrend, 95.0),
            (Uptrend, 90.0),
            (Sideways, 90.0),
            (Uptrend, 92.0),
        ]);
        let mut strategy = ShortOnlyStrategy::default();
        let log = strategy.run("INTC", &records).unwrap();

        assert_eq!(log.trades.len(), 2);
        assert_eq!(log.trades[0].action, TradeAction::Sell);
        let cover = &log.trades[1];
        assert_eq!(cover.action, TradeAction::Buy);
        assert_eq!(cover.reason, Some(ExitReason::SellCounter));
        assert!((cover.percentage_change.unwrap() - 0.08).abs() < 1e-12);
        assert!((log.final_capital - 10800.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_stop_loss_on_rally() {
        let records = feed(&[(Downtrend, 100.0), (Downtrend, 103.0), (Downtrend, 106.0)]);
        let mut strategy = ShortOnlyStrategy::default();
        let log = strategy.run("NKE", &records).unwrap();

        let cover = log.trades.last().unwrap();
        assert_eq!(cover.action, TradeAction::Buy);
        assert_eq!(cover.date, records[2].date);
        assert!(matches!(cover.reason, Some(ExitReason::StopLoss { .. })));
        assert!((cover.percentage_change.unwrap() + 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_uptrend_never_opens_short() {
        let records = feed(&[(Uptrend, 10.0), (Uptrend, 11.0), (Sideways, 12.0)]);
        let log = ShortOnlyStrategy::default().run("MCD", &records).unwrap();
        assert!(log.trades.is_empty());
    }

    #[test]
    fn test_buys_never_exceed_sells_by_more_than_one() {
        let labels = [
            Downtrend, Sideways, Downtrend, Uptrend, Uptrend, Uptrend, Downtrend, Sideways,
        ];
        let days: Vec<_> = labels
            .iter()
            .enumerate()
            .map(|(i, &l)| (l, 50.0 + (i % 3) as f64))
            .collect();
        let log = ShortOnlyStrategy::default().run("VZ", &feed(&days)).unwrap();

        let sells = log.count(TradeAction::Sell);
        let buys = log.count(TradeAction::Buy);
        assert!(sells <= buys + 1);
        assert!(buys <= sells);
    }
}
