use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::PositionSide;

/// Mutable state of one strategy run on one ticker
///
/// Created fresh at the start of every run and threaded through each day's
/// transition by value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StrategyState {
    pub side: PositionSide,
    pub entry_price: f64,
    pub entry_date: Option<NaiveDate>,
    pub units: f64,
    /// Most favourable close seen since entry
    pub peak_price: f64,
    pub stop_level: f64,
    /// Consecutive days the classifier did not confirm the position
    pub non_confirming_days: u32,
    pub days_held: u32,
    /// Cash not tied up in the open position
    pub capital: f64,
}

impl StrategyState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            side: PositionSide::Flat,
            entry_price: 0.0,
            entry_date: None,
            units: 0.0,
            peak_price: 0.0,
            stop_level: 0.0,
            non_confirming_days: 0,
            days_held: 0,
            capital: initial_capital,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }

    /// Open a position; counters restart from zero
    pub fn enter(&mut self, side: PositionSide, date: NaiveDate, price: f64, units: f64) {
        self.side = side;
        self.entry_price = price;
        self.entry_date = Some(date);
        self.units = units;
        self.peak_price = price;
        self.stop_level = 0.0;
        self.non_confirming_days = 0;
        self.days_held = 0;
    }

    /// Return to flat, keeping capital
    pub fn exit(&mut self) {
        *self = Self::new(self.capital);
    }

    /// Unrealized fractional change of the open position at `price`, signed
    /// so that a gain is positive for both longs and shorts
    pub fn change_at(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        match self.side {
            PositionSide::Flat => 0.0,
            PositionSide::Long => (price - self.entry_price) / self.entry_price,
            PositionSide::Short => (self.entry_price - price) / self.entry_price,
        }
    }

    pub fn opened_on(&self, date: NaiveDate) -> bool {
        self.entry_date == Some(date)
    }
}
