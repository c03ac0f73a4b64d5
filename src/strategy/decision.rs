use std::collections::VecDeque;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::models::{ClassProbabilities, MarketCondition, Signal};

/// Rolling window of the most recent probability triples
///
/// Oldest entries are dropped once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ProbabilityWindow {
    entries: VecDeque<ClassProbabilities>,
    capacity: usize,
}

impl ProbabilityWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, probabilities: ClassProbabilities) {
        self.entries.push_back(probabilities);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Element-wise mean of the window, `None` when empty
    pub fn mean(&self) -> Option<ClassProbabilities> {
        if self.entries.is_empty() {
            return None;
        }
        let n = self.entries.len() as f64;
        let sum = self.entries.iter().fold([0.0; 3], |mut acc, p| {
            for (a, v) in acc.iter_mut().zip(p.as_array()) {
                *a += v;
            }
            acc
        });
        Some(ClassProbabilities::new(sum[0] / n, sum[1] / n, sum[2] / n))
    }

    /// How many entries have each label as their most likely class
    pub fn label_count(&self, label: MarketCondition) -> usize {
        self.entries
            .iter()
            .filter(|p| p.most_likely() == label)
            .count()
    }
}

/// Maps the day's probabilities (and recent history) to a discrete action
pub trait DecisionFunction: Send {
    fn name(&self) -> &str;

    /// `window` already contains `today` as its newest entry
    fn decide(&mut self, today: &ClassProbabilities, window: &ProbabilityWindow) -> Signal;

    /// Restore any internal state (e.g. RNG) to its initial value
    fn reset(&mut self) {}
}

/// Buy on a confident uptrend, sell once the non-uptrend mass is large enough
#[derive(Debug, Clone)]
pub struct UptrendThreshold {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl DecisionFunction for UptrendThreshold {
    fn name(&self) -> &str {
        "UptrendThreshold"
    }

    fn decide(&mut self, today: &ClassProbabilities, _window: &ProbabilityWindow) -> Signal {
        if today.uptrend >= self.buy_threshold {
            Signal::Buy
        } else if today.sideways + today.downtrend >= self.sell_threshold {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

/// Roulette-wheel draw over the window's mean probabilities
///
/// Uptrend draws buy, downtrend draws sell, sideways draws hold.
#[derive(Debug, Clone)]
pub struct WeightedRandom {
    seed: u64,
    rng: StdRng,
}

impl WeightedRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DecisionFunction for WeightedRandom {
    fn name(&self) -> &str {
        "WeightedRandom"
    }

    fn decide(&mut self, today: &ClassProbabilities, window: &ProbabilityWindow) -> Signal {
        let weights = window.mean().unwrap_or(*today).as_array();

        // Rejects all-zero, negative and non-finite weights
        let wheel = match WeightedIndex::new(weights) {
            Ok(wheel) => wheel,
            Err(_) => return Signal::Hold,
        };

        match MarketCondition::ALL[wheel.sample(&mut self.rng)] {
            MarketCondition::Uptrend => Signal::Buy,
            MarketCondition::Sideways => Signal::Hold,
            MarketCondition::Downtrend => Signal::Sell,
        }
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

/// Majority vote of predicted labels over a full window
///
/// Holds until the window is full and whenever the vote is tied.
#[derive(Debug, Clone, Default)]
pub struct RollingMajority;

impl DecisionFunction for RollingMajority {
    fn name(&self) -> &str {
        "RollingMajority"
    }

    fn decide(&mut self, _today: &ClassProbabilities, window: &ProbabilityWindow) -> Signal {
        if !window.is_full() {
            return Signal::Hold;
        }

        let up = window.label_count(MarketCondition::Uptrend);
        let side = window.label_count(MarketCondition::Sideways);
        let down = window.label_count(MarketCondition::Downtrend);

        if up > side && up > down {
            Signal::Buy
        } else if down > up && down > side {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

/// Decision function selection, as read from configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionConfig {
    UptrendThreshold {
        buy_threshold: f64,
        sell_threshold: f64,
    },
    WeightedRandom {
        seed: u64,
    },
    RollingMajority,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        DecisionConfig::WeightedRandom { seed: 42 }
    }
}

impl DecisionConfig {
    pub fn build(&self) -> Box<dyn DecisionFunction> {
        match *self {
            DecisionConfig::UptrendThreshold {
                buy_threshold,
                sell_threshold,
            } => Box::new(UptrendThreshold {
                buy_threshold,
                sell_threshold,
            }),
            DecisionConfig::WeightedRandom { seed } => Box::new(WeightedRandom::new(seed)),
            DecisionConfig::RollingMajority => Box::new(RollingMajority),
        }
    }
}
