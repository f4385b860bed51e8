// src/core/gate.rs — Evaluate / auto-fix round loop for one lesson

use super::autofix::apply_fixes;
use super::types::{GateState, Lesson, LoopOutcome, Verdict};
use crate::evaluator::Evaluator;

pub const DEFAULT_MAX_ROUNDS: u8 = 2;

/// Drive one lesson through up to `max_rounds` evaluate/fix rounds.
///
/// Terminal states:
/// - `Approved` / `Rejected`: the evaluator's verdict, taken as-is.
/// - `Stuck`: the report asked for revision but no fix could be applied
///   (typically only high severity issues remain).
/// - `FixApplied`: fixes were applied in the last allowed round and no
///   round was left to re-check them.
///
/// The returned lesson is the last fixed version, even if it was never
/// re-evaluated. Evaluator errors propagate unchanged and abandon the lesson.
pub async fn quality_check_loop(
    lesson: &Lesson,
    evaluator: &dyn Evaluator,
    max_rounds: u8,
) -> anyhow::Result<LoopOutcome> {
    let max_rounds = max_rounds.max(1);
    let mut current = lesson.clone();
    let mut round: u8 = 0;
    let mut fixes_applied = 0;

    loop {
        round += 1;
        tracing::debug!(lesson = %current.lesson_id, round, state = %GateState::Checking, "Checking");

        let report = evaluator.evaluate(&current).await?;

        let terminal = match report.verdict {
            Verdict::Approved => Some(GateState::Approved),
            Verdict::Rejected => Some(GateState::Rejected),
            Verdict::RevisionNeeded => None,
        };
        if let Some(state) = terminal {
            tracing::info!(
                lesson = %current.lesson_id,
                round,
                score = report.overall_score,
                state = %state,
                "Quality gate settled"
            );
            return Ok(LoopOutcome {
                final_lesson: current,
                final_report: report,
                rounds: round,
                state,
                fixes_applied,
            });
        }

        let fix = apply_fixes(&current, &report);
        if fix.applied_count == 0 {
            tracing::info!(
                lesson = %current.lesson_id,
                round,
                high_issues = fix.remaining_high_issues,
                "No applicable fixes, lesson stuck"
            );
            return Ok(LoopOutcome {
                final_lesson: current,
                final_report: report,
                rounds: round,
                state: GateState::Stuck,
                fixes_applied,
            });
        }

        fixes_applied += fix.applied_count;
        current = fix.fixed;
        tracing::info!(
            lesson = %current.lesson_id,
            round,
            applied = fix.applied_count,
            high_issues = fix.remaining_high_issues,
            "Applied fixes"
        );

        if round >= max_rounds {
            return Ok(LoopOutcome {
                final_lesson: current,
                final_report: report,
                rounds: round,
                state: GateState::FixApplied,
                fixes_applied,
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::types::{QualityIssue, QualityReport, ScoreBreakdown, Segment, Severity};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns queued reports in order and remembers what it was shown.
    pub(crate) struct QueueEvaluator {
        pub reports: Mutex<Vec<anyhow::Result<QualityReport>>>,
        pub seen: Mutex<Vec<Lesson>>,
    }

    impl QueueEvaluator {
        pub fn new(mut reports: Vec<anyhow::Result<QualityReport>>) -> Self {
            reports.reverse();
            Self {
                reports: Mutex::new(reports),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Evaluator for QueueEvaluator {
        async fn evaluate(&self, lesson: &Lesson) -> anyhow::Result<QualityReport> {
            self.seen.lock().unwrap().push(lesson.clone());
            self.reports
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more scripted reports")))
        }
    }

    pub(crate) fn lesson() -> Lesson {
        Lesson {
            lesson_id: "lesson-01-01".into(),
            segments: vec![
                Segment {
                    segment_id: "seg-01".into(),
                    script: "各位獸醫師大家好，今天我們來談費用溝通。".into(),
                    extra: serde_json::Map::new(),
                },
                Segment {
                    segment_id: "seg-02".into(),
                    script: "透過選項式溝通的方式，我們可以有效地進行費用說明的實施。".into(),
                    extra: serde_json::Map::new(),
                },
            ],
            extra: serde_json::Map::new(),
        }
    }

    pub(crate) fn report(verdict: Verdict, issues: Vec<QualityIssue>) -> QualityReport {
        let overall_score = match verdict {
            Verdict::Approved => 85.0,
            Verdict::RevisionNeeded => 72.0,
            Verdict::Rejected => 45.0,
        };
        QualityReport {
            lesson_id: "lesson-01-01".into(),
            overall_score,
            scores: ScoreBreakdown::uniform(8),
            issues,
            general_feedback: "整體回饋".into(),
            verdict,
        }
    }

    pub(crate) fn issue(severity: Severity, original: &str, revised: &str) -> QualityIssue {
        QualityIssue {
            severity,
            segment_id: "seg-02".into(),
            issue: "書面語過多".into(),
            original_text: original.into(),
            suggestion: "改為口語".into(),
            revised_text: revised.into(),
        }
    }

    #[tokio::test]
    async fn test_approved_first_round() {
        let ev = QueueEvaluator::new(vec![Ok(report(Verdict::Approved, vec![]))]);
        let out = quality_check_loop(&lesson(), &ev, 2).await.unwrap();
        assert_eq!(out.state, GateState::Approved);
        assert_eq!(out.rounds, 1);
        assert_eq!(out.fixes_applied, 0);
        assert_eq!(out.final_lesson, lesson());
        assert_eq!(ev.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_is_terminal() {
        let ev = QueueEvaluator::new(vec![Ok(report(
            Verdict::Rejected,
            vec![issue(Severity::Low, "有效地", "好好地")],
        ))]);
        let out = quality_check_loop(&lesson(), &ev, 3).await.unwrap();
        assert_eq!(out.state, GateState::Rejected);
        assert_eq!(out.rounds, 1);
        // No fixes attempted on a rejected lesson
        assert_eq!(out.final_lesson, lesson());
    }

    #[tokio::test]
    async fn test_high_only_is_stuck_after_one_round() {
        let ev = QueueEvaluator::new(vec![
            Ok(report(
                Verdict::RevisionNeeded,
                vec![issue(Severity::High, "透過選項式溝通的方式", "用選項式溝通")],
            )),
            Ok(report(Verdict::Approved, vec![])),
        ]);
        let out = quality_check_loop(&lesson(), &ev, 2).await.unwrap();
        assert_eq!(out.state, GateState::Stuck);
        assert_eq!(out.rounds, 1);
        assert_eq!(out.final_report.verdict, Verdict::RevisionNeeded);
        assert_eq!(ev.calls(), 1);
    }

    #[tokio::test]
    async fn test_fix_then_approved() {
        let ev = QueueEvaluator::new(vec![
            Ok(report(
                Verdict::RevisionNeeded,
                vec![issue(Severity::Medium, "透過選項式溝通的方式", "用選項式溝通")],
            )),
            Ok(report(Verdict::Approved, vec![])),
        ]);
        let out = quality_check_loop(&lesson(), &ev, 2).await.unwrap();
        assert_eq!(out.state, GateState::Approved);
        assert_eq!(out.rounds, 2);
        assert_eq!(out.fixes_applied, 1);
        assert!(out.final_lesson.segments[1].script.starts_with("用選項式溝通"));

        // Round two evaluated the fixed lesson
        let seen = ev.seen.lock().unwrap();
        assert!(seen[1].segments[1].script.starts_with("用選項式溝通"));
    }

    #[tokio::test]
    async fn test_max_rounds_reached_after_fix() {
        let ev = QueueEvaluator::new(vec![
            Ok(report(
                Verdict::RevisionNeeded,
                vec![issue(Severity::Low, "有效地", "好好地")],
            )),
            Ok(report(
                Verdict::RevisionNeeded,
                vec![issue(Severity::Low, "費用說明的實施", "講費用")],
            )),
        ]);
        let out = quality_check_loop(&lesson(), &ev, 2).await.unwrap();
        assert_eq!(out.state, GateState::FixApplied);
        assert_eq!(out.rounds, 2);
        assert_eq!(out.fixes_applied, 2);
        assert_eq!(ev.calls(), 2);
        // Final lesson adopts the fix from the last round even though it was never re-checked
        let script = &out.final_lesson.segments[1].script;
        assert!(script.contains("好好地") && script.contains("講費用"));
    }

    #[tokio::test]
    async fn test_single_round_budget() {
        let ev = QueueEvaluator::new(vec![Ok(report(
            Verdict::RevisionNeeded,
            vec![issue(Severity::Medium, "有效地", "好好地")],
        ))]);
        let out = quality_check_loop(&lesson(), &ev, 1).await.unwrap();
        assert_eq!(out.state, GateState::FixApplied);
        assert_eq!(out.rounds, 1);
    }

    #[tokio::test]
    async fn test_zero_max_rounds_treated_as_one() {
        let ev = QueueEvaluator::new(vec![Ok(report(Verdict::Approved, vec![]))]);
        let out = quality_check_loop(&lesson(), &ev, 0).await.unwrap();
        assert_eq!(out.rounds, 1);
        assert_eq!(out.state, GateState::Approved);
    }

    #[tokio::test]
    async fn test_evaluator_error_propagates() {
        let ev = QueueEvaluator::new(vec![
            Ok(report(
                Verdict::RevisionNeeded,
                vec![issue(Severity::Medium, "有效地", "好好地")],
            )),
            Err(anyhow::anyhow!("HTTP 529 overloaded")),
        ]);
        let err = quality_check_loop(&lesson(), &ev, 3).await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_input_lesson_untouched() {
        let original = lesson();
        let ev = QueueEvaluator::new(vec![
            Ok(report(
                Verdict::RevisionNeeded,
                vec![issue(Severity::Medium, "有效地", "好好地")],
            )),
            Ok(report(Verdict::Approved, vec![])),
        ]);
        let out = quality_check_loop(&original, &ev, 2).await.unwrap();
        assert_ne!(out.final_lesson, original);
        assert_eq!(original, lesson());
    }
}
