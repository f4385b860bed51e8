// src/core/autofix.rs — Apply low/medium severity fixes from a quality report
//
// Fixes operate on segment fields directly, never on a serialized copy of the
// whole lesson, so a span can only ever match inside its own segment.

use super::types::{FixResult, Lesson, QualityReport, Severity};

/// Apply every non-high issue in report order to a copy of `lesson`.
///
/// High severity issues are left for human review. An issue whose segment is
/// missing, or whose `original_text` is not a literal substring of that
/// segment's script, is skipped. Only the first occurrence is replaced.
pub fn apply_fixes(lesson: &Lesson, report: &QualityReport) -> FixResult {
    let mut fixed = lesson.clone();
    let mut applied_count = 0;

    for issue in &report.issues {
        if issue.severity == Severity::High {
            continue;
        }

        let Some(segment) = fixed.segment_mut(&issue.segment_id) else {
            tracing::debug!(
                segment = %issue.segment_id,
                "Fix skipped: segment not found"
            );
            continue;
        };

        // An empty span would "match" at offset 0 and prepend text.
        if issue.original_text.is_empty() || !segment.script.contains(&issue.original_text) {
            tracing::debug!(
                segment = %issue.segment_id,
                "Fix skipped: original text not present"
            );
            continue;
        }

        segment.script = segment
            .script
            .replacen(&issue.original_text, &issue.revised_text, 1);
        applied_count += 1;
    }

    FixResult {
        fixed,
        applied_count,
        remaining_high_issues: report.high_issue_count(),
    }
}
