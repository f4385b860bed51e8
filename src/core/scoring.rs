// src/core/scoring.rs — Weighted overall score and verdict policy

use super::types::{QualityIssue, QualityReport, ScoreBreakdown, Severity, Verdict};

pub const APPROVE_THRESHOLD: f64 = 80.0;
pub const REJECT_THRESHOLD: f64 = 60.0;

/// Dimension weights in `ScoreBreakdown::entries()` order. Sum is 100.
const WEIGHTS: [u32; 7] = [20, 20, 15, 15, 10, 10, 10];

/// Weighted mean of the seven dimensions scaled to 0-100, rounded half up.
pub fn calculate_overall_score(scores: &ScoreBreakdown) -> u32 {
    let entries = scores.entries();
    let weighted: u32 = entries
        .iter()
        .zip(WEIGHTS)
        .map(|((_, score), w)| *score as u32 * w)
        .sum();
    let total: u32 = WEIGHTS.iter().sum();
    // (weighted / total) * 10, rounded, in integer arithmetic
    (weighted * 10 + total / 2) / total
}

pub fn determine_verdict(overall_score: f64, issues: &[QualityIssue]) -> Verdict {
    let has_high = issues.iter().any(|i| i.severity == Severity::High);
    if overall_score < REJECT_THRESHOLD {
        Verdict::Rejected
    } else if overall_score >= APPROVE_THRESHOLD && !has_high {
        Verdict::Approved
    } else {
        Verdict::RevisionNeeded
    }
}

/// Check that a report is internally consistent.
///
/// Returns every problem found, not just the first.
pub fn validate_report(report: &QualityReport) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    for (name, score) in report.scores.entries() {
        if !(1..=10).contains(&score) {
            problems.push(format!("{name} score {score} outside 1-10"));
        }
    }

    let overall = report.overall_score;
    if !overall.is_finite() || !(0.0..=100.0).contains(&overall) {
        problems.push(format!("overall_score {overall} outside 0-100"));
    }

    match report.verdict {
        Verdict::Approved => {
            if overall < APPROVE_THRESHOLD || report.high_issue_count() > 0 {
                problems.push(
                    "approved requires overall_score >= 80 and no high severity issue".into(),
                );
            }
        }
        Verdict::Rejected => {
            if overall >= REJECT_THRESHOLD {
                problems.push("rejected requires overall_score < 60".into());
            }
        }
        Verdict::RevisionNeeded => {}
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(v: [u8; 7]) -> ScoreBreakdown {
        ScoreBreakdown {
            spoken_naturalness: v[0],
            professional_accuracy: v[1],
            teaching_structure: v[2],
            case_practicality: v[3],
            pacing: v[4],
            visual_directions: v[5],
            quiz_quality: v[6],
        }
    }

    fn issue(severity: Severity) -> QualityIssue {
        QualityIssue {
            severity,
            segment_id: "seg-01".into(),
            issue: "測試問題描述".into(),
            original_text: "原始文字內容".into(),
            suggestion: "修改建議內容".into(),
            revised_text: "修改後文字內容".into(),
        }
    }

    fn report(overall: f64, verdict: Verdict, issues: Vec<QualityIssue>) -> QualityReport {
        QualityReport {
            lesson_id: "lesson-01-01".into(),
            overall_score: overall,
            scores: ScoreBreakdown::uniform(8),
            issues,
            general_feedback: String::new(),
            verdict,
        }
    }

    #[test]
    fn test_weighted_mixed_scores() {
        // 775 / 100 * 10 = 77.5 -> 78
        assert_eq!(calculate_overall_score(&scores([8, 9, 8, 7, 8, 6, 7])), 78);
    }

    #[test]
    fn test_extremes() {
        assert_eq!(calculate_overall_score(&ScoreBreakdown::uniform(10)), 100);
        assert_eq!(calculate_overall_score(&ScoreBreakdown::uniform(1)), 10);
    }

    #[test]
    fn test_first_two_dimensions_weigh_most() {
        assert_eq!(calculate_overall_score(&scores([10, 10, 5, 5, 5, 5, 5])), 70);
        assert_eq!(calculate_overall_score(&scores([5, 5, 10, 10, 10, 10, 10])), 80);
    }

    #[test]
    fn test_verdict_approved() {
        assert_eq!(determine_verdict(80.0, &[]), Verdict::Approved);
        assert_eq!(determine_verdict(85.0, &[issue(Severity::Medium)]), Verdict::Approved);
        assert_eq!(determine_verdict(100.0, &[issue(Severity::Low)]), Verdict::Approved);
    }

    #[test]
    fn test_verdict_high_issue_blocks_approval() {
        assert_eq!(
            determine_verdict(85.0, &[issue(Severity::High)]),
            Verdict::RevisionNeeded
        );
        assert_eq!(
            determine_verdict(95.0, &[issue(Severity::High), issue(Severity::Low)]),
            Verdict::RevisionNeeded
        );
    }

    #[test]
    fn test_verdict_middle_band() {
        assert_eq!(determine_verdict(60.0, &[]), Verdict::RevisionNeeded);
        assert_eq!(determine_verdict(79.0, &[]), Verdict::RevisionNeeded);
        assert_eq!(
            determine_verdict(70.0, &[issue(Severity::Medium)]),
            Verdict::RevisionNeeded
        );
    }

    #[test]
    fn test_verdict_rejected() {
        assert_eq!(determine_verdict(59.0, &[]), Verdict::Rejected);
        assert_eq!(determine_verdict(0.0, &[]), Verdict::Rejected);
        // Low score wins over high issues
        assert_eq!(determine_verdict(30.0, &[issue(Severity::High)]), Verdict::Rejected);
    }

    #[test]
    fn test_validate_consistent_reports() {
        assert!(validate_report(&report(85.0, Verdict::Approved, vec![])).is_ok());
        assert!(validate_report(&report(50.0, Verdict::Rejected, vec![])).is_ok());
        assert!(
            validate_report(&report(90.0, Verdict::RevisionNeeded, vec![issue(Severity::High)]))
                .is_ok()
        );
    }

    #[test]
    fn test_validate_rejects_inconsistent_verdicts() {
        let errs = validate_report(&report(75.0, Verdict::Approved, vec![])).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(
            validate_report(&report(90.0, Verdict::Approved, vec![issue(Severity::High)]))
                .is_err()
        );
        assert!(validate_report(&report(65.0, Verdict::Rejected, vec![])).is_err());
    }

    #[test]
    fn test_validate_reports_all_range_problems() {
        let mut r = report(120.0, Verdict::RevisionNeeded, vec![]);
        r.scores.pacing = 0;
        r.scores.quiz_quality = 11;
        let errs = validate_report(&r).unwrap_err();
        assert_eq!(errs.len(), 3);
        assert!(errs.iter().any(|e| e.contains("字數節奏")));
    }
}
