// src/evaluator/mod.rs — Evaluator collaborators
//
// The quality gate never talks to a model directly. It calls an `Evaluator`
// and, in dry-run mode, a `CostEstimator`.

pub mod estimator;
pub mod judge;
pub mod parser;

use async_trait::async_trait;

use crate::core::types::{Lesson, QualityReport};

/// Produces a quality report for one lesson.
///
/// Implementations may be slow and may retry internally. The returned
/// verdict is trusted as-is by the gate.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, lesson: &Lesson) -> anyhow::Result<QualityReport>;

    /// Actual USD spent since the last call, if the evaluator tracks it.
    /// `None` means the caller should fall back to an estimate.
    fn take_spend(&self) -> Option<f64> {
        None
    }
}

/// Predicts the cost of evaluating a lesson without calling anything.
pub trait CostEstimator: Send + Sync {
    fn estimate(&self, lesson: &Lesson) -> f64;
}
