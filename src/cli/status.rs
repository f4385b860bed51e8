// src/cli/status.rs — Review progress across lessons and reports

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::state::{read_history, read_run_state, RunHistoryEntry, RunState};
use crate::core::types::{ReportArtifact, Verdict};
use crate::infra::config::Config;
use crate::infra::paths;
use crate::store::{FsUnitStore, UnitStore};

const RECENT_RUNS: usize = 5;

/// Aggregated view of what has been reviewed so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewStatus {
    pub lessons: usize,
    pub reports: usize,
    pub approved: usize,
    pub revision_needed: usize,
    pub rejected: usize,
    pub forced_manual_review: usize,
    pub average_score: Option<f64>,
    /// Lessons with no report yet, in id order.
    pub pending: Vec<String>,
    /// Per lesson: its persisted verdict label, or `None` if pending.
    pub per_lesson: Vec<(String, Option<String>)>,
}

fn verdict_label(artifact: &ReportArtifact) -> String {
    if artifact.forced_manual_review {
        "manual_review".into()
    } else {
        artifact.report.verdict.to_string()
    }
}

/// Collect review status from a store.
pub fn collect_status(store: &dyn UnitStore) -> anyhow::Result<ReviewStatus> {
    let ids = match store.list_ids() {
        Ok(ids) => ids,
        Err(e) if e.is_setup() => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let reports: BTreeMap<String, ReportArtifact> = store.list_reports()?.into_iter().collect();

    let mut status = ReviewStatus {
        lessons: ids.len(),
        reports: reports.len(),
        ..ReviewStatus::default()
    };

    let mut score_sum = 0.0;
    for artifact in reports.values() {
        score_sum += artifact.report.overall_score;
        if artifact.forced_manual_review {
            status.forced_manual_review += 1;
            continue;
        }
        match artifact.report.verdict {
            Verdict::Approved => status.approved += 1,
            Verdict::RevisionNeeded => status.revision_needed += 1,
            Verdict::Rejected => status.rejected += 1,
        }
    }
    if !reports.is_empty() {
        status.average_score = Some(score_sum / reports.len() as f64);
    }

    for id in ids {
        let label = reports.get(&id).map(verdict_label);
        if label.is_none() {
            status.pending.push(id.clone());
        }
        status.per_lesson.push((id, label));
    }
    Ok(status)
}

fn print_run_state(state: &RunState) {
    println!();
    println!("  Last run:   {} ({:?})", state.run_id, state.status);
    println!("    Updated:  {}", state.updated_at.to_rfc3339());
    println!("    Spent:    ${:.4}", state.spent_usd);
    if let Some(reason) = state.halt_reason {
        println!("    Stopped:  {}", reason);
    }
    if let Some(ref id) = state.resume_from {
        println!("    Resume:   lessongate check --start-from {}", id);
    }
}

fn print_history(entries: &[RunHistoryEntry]) {
    println!();
    println!("  Recent runs:");
    for e in entries.iter().rev() {
        println!(
            "    {}  {:<22} processed {:>3}  ${:.4}{}",
            e.finished_at.format("%Y-%m-%d %H:%M"),
            e.halt_reason.to_string(),
            e.processed,
            e.spent_usd,
            if e.dry_run { "  (dry run)" } else { "" }
        );
    }
}

/// Display review status.
pub async fn show_status(
    config: &Config,
    detailed: bool,
    lessons_dir: Option<&str>,
    reports_dir: Option<&str>,
) -> anyhow::Result<()> {
    let lessons_dir = lessons_dir.unwrap_or(&config.batch.lessons_dir);
    let reports_dir = reports_dir.unwrap_or(&config.batch.reports_dir);
    let store = FsUnitStore::new(lessons_dir, reports_dir);
    let status = collect_status(&store)?;

    println!("lessongate v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  Lessons:    {} ({})", status.lessons, lessons_dir);
    println!("  Reports:    {} ({})", status.reports, reports_dir);
    println!("    Approved:         {}", status.approved);
    println!("    Manual review:    {}", status.forced_manual_review);
    println!("    Revision needed:  {}", status.revision_needed);
    println!("    Rejected:         {}", status.rejected);
    if let Some(avg) = status.average_score {
        println!("    Avg score:        {:.1}", avg);
    }
    println!("  Pending:    {}", status.pending.len());

    let state_dir = paths::state_dir();
    if let Some(state) = read_run_state(&state_dir) {
        print_run_state(&state);
    }

    if detailed {
        let history = read_history(&state_dir, RECENT_RUNS);
        if !history.is_empty() {
            print_history(&history);
        }
        println!();
        for (id, label) in &status.per_lesson {
            println!("  {:<24} {}", id, label.as_deref().unwrap_or("pending"));
        }
        if !Path::new(lessons_dir).is_dir() {
            println!("  (lessons directory not found)");
        }
    }

    Ok(())
}
