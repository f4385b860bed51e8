// src/cli/progress.rs — Terminal progress renderer for batch runs

use crate::core::types::{BatchEvent, UnitOutcome};
use crate::util::{progress_bar, truncate_str};

const BAR_WIDTH: usize = 20;

/// One line of progress output for an event, or `None` for silent events.
pub fn format_event(event: &BatchEvent) -> Option<String> {
    match event {
        BatchEvent::Started {
            total,
            start_index,
            dry_run,
            ..
        } => {
            let mode = if *dry_run { " (dry run)" } else { "" };
            if *start_index > 0 {
                Some(format!(
                    "[batch] {} lesson(s), resuming at #{}{}",
                    total,
                    start_index + 1,
                    mode
                ))
            } else {
                Some(format!("[batch] {} lesson(s){}", total, mode))
            }
        }
        BatchEvent::UnitStart {
            position,
            total,
            unit_id,
        } => Some(format!(
            "{} {}/{} {}",
            progress_bar(position - 1, *total, BAR_WIDTH),
            position,
            total,
            unit_id
        )),
        BatchEvent::UnitDone {
            unit_id,
            outcome,
            rounds,
            score,
            spent_usd,
        } => {
            let marker = match outcome {
                UnitOutcome::Approved => "ok",
                UnitOutcome::ForcedManualReview => "review",
                UnitOutcome::Rejected => "rejected",
                UnitOutcome::Simulated { .. } => "sim",
                _ => "revise",
            };
            let score = score.map(|s| format!(" score={:.0}", s)).unwrap_or_default();
            Some(format!(
                "  [{}] {} -> {}{} rounds={} (${:.2})",
                marker, unit_id, outcome, score, rounds, spent_usd
            ))
        }
        BatchEvent::UnitFailed {
            unit_id,
            outcome,
            error,
            consecutive_failures,
        } => {
            let streak = if *outcome == UnitOutcome::EvaluatorFailed {
                format!(" (consecutive failures: {})", consecutive_failures)
            } else {
                String::new()
            };
            Some(format!(
                "  [fail] {} -> {}: {}{}",
                unit_id,
                outcome,
                truncate_str(error, 160),
                streak
            ))
        }
        BatchEvent::Halted {
            reason,
            resume_from,
        } => Some(match resume_from {
            Some(id) => format!("[halt] {}; resume with --start-from {}", reason, id),
            None => format!("[halt] {}", reason),
        }),
        // The summary is printed to stdout by the command itself
        BatchEvent::Complete { .. } => None,
    }
}

/// Build a progress callback that writes formatted output to stderr.
///
/// All progress output goes to stderr so stdout remains clean for the summary.
/// Returns a closure suitable for `BatchOrchestrator::with_progress()`.
pub fn terminal_progress() -> impl Fn(BatchEvent) + Send + 'static {
    move |event| {
        if let Some(line) = format_event(&event) {
            eprintln!("{}", line);
        }
    }
}
