// src/evaluator/estimator.rs — Flat-rate cost estimate

use super::CostEstimator;
use crate::core::types::Lesson;

pub const DEFAULT_COST_PER_CHECK_USD: f64 = 0.08;

/// Charges the same amount for every check regardless of lesson size.
#[derive(Debug, Clone, Copy)]
pub struct FlatRateEstimator {
    per_check_usd: f64,
}

impl FlatRateEstimator {
    pub fn new(per_check_usd: f64) -> Self {
        Self {
            per_check_usd: per_check_usd.max(0.0),
        }
    }
}

impl Default for FlatRateEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_COST_PER_CHECK_USD)
    }
}

impl CostEstimator for FlatRateEstimator {
    fn estimate(&self, _lesson: &Lesson) -> f64 {
        self.per_check_usd
    }
}
