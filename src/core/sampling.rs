// src/core/sampling.rs — Sampling override: force human review of every Nth lesson

use super::gate::quality_check_loop;
use super::types::{Lesson, QualityReport, SampledOutcome, Verdict};
use crate::evaluator::Evaluator;

pub const SAMPLING_NOTE: &str =
    "[SAMPLING] Selected for manual spot-check; a reviewer must confirm this approval.";

#[derive(Debug, Clone, Copy)]
pub struct GateOptions {
    pub max_rounds: u8,
    /// Every `sample_rate`-th lesson (by absolute index) is sampled. 0 disables sampling.
    pub sample_rate: usize,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            max_rounds: super::gate::DEFAULT_MAX_ROUNDS,
            sample_rate: 5,
        }
    }
}

/// Index 0 is always sampled when sampling is enabled.
pub fn should_force_manual_review(index: usize, sample_rate: usize) -> bool {
    sample_rate > 0 && index % sample_rate == 0
}

/// Downgraded copy of an approved report.
fn downgrade(report: &QualityReport) -> QualityReport {
    let mut sampled = report.clone();
    sampled.verdict = Verdict::RevisionNeeded;
    sampled.general_feedback = if report.general_feedback.is_empty() {
        SAMPLING_NOTE.to_string()
    } else {
        format!("{} {}", report.general_feedback, SAMPLING_NOTE)
    };
    sampled
}

/// Run the round loop, then downgrade an approved verdict to
/// `revision_needed` when `index` falls on the sampling grid.
///
/// Only approvals are overridden. A sampled lesson that ends rejected or
/// stuck keeps its report unchanged and is not flagged.
pub async fn quality_check_with_sampling(
    lesson: &Lesson,
    index: usize,
    evaluator: &dyn Evaluator,
    options: GateOptions,
) -> anyhow::Result<SampledOutcome> {
    let outcome = quality_check_loop(lesson, evaluator, options.max_rounds).await?;

    let sampled = should_force_manual_review(index, options.sample_rate);
    let forced = sampled && outcome.final_report.verdict == Verdict::Approved;

    let final_report = if forced {
        tracing::info!(lesson = %lesson.lesson_id, index, "Approval sampled for manual review");
        downgrade(&outcome.final_report)
    } else {
        outcome.final_report
    };

    Ok(SampledOutcome {
        final_lesson: outcome.final_lesson,
        final_report,
        rounds: outcome.rounds,
        state: outcome.state,
        fixes_applied: outcome.fixes_applied,
        forced_manual_review: forced,
    })
}
