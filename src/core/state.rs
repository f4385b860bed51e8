// src/core/state.rs — Run state file writer for external monitoring and resume
//
// Writes `<state_dir>/run-state.json` after every batch event and appends
// finished runs to `<state_dir>/run-history.jsonl`. The run-state file is
// written atomically and kept after the run so the exact resume point
// survives the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::types::{BatchEvent, BatchTally, HaltReason};
use crate::util::write_atomic;

const STATE_FILE: &str = "run-state.json";
const HISTORY_FILE: &str = "run-history.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Halted,
    Complete,
}

/// JSON structure written to `run-state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    pub dry_run: bool,
    pub total: usize,
    pub start_index: usize,
    /// 1-based position of the unit most recently started.
    pub position: usize,
    pub current_unit: Option<String>,
    pub tally: BatchTally,
    pub spent_usd: f64,
    pub consecutive_failures: u32,
    pub halt_reason: Option<HaltReason>,
    pub resume_from: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JSON structure appended to `run-history.jsonl` (one line per finished run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    pub run_id: String,
    pub dry_run: bool,
    pub processed: usize,
    pub pending: usize,
    pub tally: BatchTally,
    pub spent_usd: f64,
    pub halt_reason: HaltReason,
    pub resume_from: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: String::new(),
            status: RunStatus::Running,
            dry_run: false,
            total: 0,
            start_index: 0,
            position: 0,
            current_unit: None,
            tally: BatchTally::default(),
            spent_usd: 0.0,
            consecutive_failures: 0,
            halt_reason: None,
            resume_from: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Fold one event into the state. Returns a history entry when the run finished.
    fn apply(&mut self, event: &BatchEvent) -> Option<RunHistoryEntry> {
        self.updated_at = Utc::now();
        match event {
            BatchEvent::Started {
                run_id,
                total,
                start_index,
                dry_run,
            } => {
                self.run_id = run_id.clone();
                self.total = *total;
                self.start_index = *start_index;
                self.position = *start_index;
                self.dry_run = *dry_run;
                self.started_at = self.updated_at;
            }
            BatchEvent::UnitStart {
                position, unit_id, ..
            } => {
                self.position = *position;
                self.current_unit = Some(unit_id.clone());
            }
            BatchEvent::UnitDone {
                outcome, spent_usd, ..
            } => {
                self.tally.record(*outcome);
                self.spent_usd = *spent_usd;
                self.consecutive_failures = 0;
            }
            BatchEvent::UnitFailed {
                outcome,
                consecutive_failures,
                ..
            } => {
                self.tally.record(*outcome);
                self.consecutive_failures = *consecutive_failures;
            }
            BatchEvent::Halted {
                reason,
                resume_from,
            } => {
                self.status = RunStatus::Halted;
                self.halt_reason = Some(*reason);
                self.resume_from = resume_from.clone();
            }
            BatchEvent::Complete { summary } => {
                if summary.halt_reason == HaltReason::Completed {
                    self.status = RunStatus::Complete;
                }
                self.current_unit = None;
                self.tally = summary.tally.clone();
                self.spent_usd = summary.spent_usd;
                self.halt_reason = Some(summary.halt_reason);
                self.resume_from = summary.resume_from.clone();
                return Some(RunHistoryEntry {
                    run_id: summary.run_id.clone(),
                    dry_run: summary.dry_run,
                    processed: summary.processed,
                    pending: summary.pending,
                    tally: summary.tally.clone(),
                    spent_usd: summary.spent_usd,
                    halt_reason: summary.halt_reason,
                    resume_from: summary.resume_from.clone(),
                    finished_at: self.updated_at,
                });
            }
        }
        None
    }
}

/// Build a progress callback that keeps `run-state.json` in `state_dir` current.
///
/// `inner` is an optional inner callback (e.g. terminal_progress) to delegate to.
/// Write failures are logged and never interrupt the batch.
pub fn state_writer_progress(
    state_dir: PathBuf,
    inner: Option<Box<dyn Fn(BatchEvent) + Send>>,
) -> impl Fn(BatchEvent) + Send + 'static {
    let live = Arc::new(Mutex::new(RunState::new()));

    move |event: BatchEvent| {
        if let Some(ref cb) = inner {
            cb(event.clone());
        }

        let Ok(mut state) = live.lock() else { return };
        let finished = state.apply(&event);

        if let Err(e) = write_state_file(&state_dir, &state) {
            tracing::debug!("Failed to write {}: {}", STATE_FILE, e);
        }
        if let Some(entry) = finished {
            if let Err(e) = append_history(&state_dir, &entry) {
                tracing::debug!("Failed to append {}: {}", HISTORY_FILE, e);
            }
        }
    }
}

pub fn state_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}

fn history_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(HISTORY_FILE)
}

fn write_state_file(state_dir: &Path, state: &RunState) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    write_atomic(&state_file_path(state_dir), json.as_bytes())?;
    Ok(())
}

/// Append a finished run to `run-history.jsonl`, rotating if needed.
fn append_history(state_dir: &Path, entry: &RunHistoryEntry) -> anyhow::Result<()> {
    std::fs::create_dir_all(state_dir)?;
    let path = history_file_path(state_dir);

    // Rotate at 1000 lines or 1MB
    if let Ok(meta) = std::fs::metadata(&path) {
        let too_big = meta.len() > 1_048_576;
        let too_long = std::fs::read_to_string(&path)
            .map(|c| c.lines().count() >= 1000)
            .unwrap_or(false);
        if too_big || too_long {
            rotate_history(&path)?;
        }
    }

    let line = serde_json::to_string(entry)?;
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(f, "{}", line)?;
    Ok(())
}

/// Keep only the last 500 lines.
fn rotate_history(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let keep = &lines[lines.len().saturating_sub(500)..];
    let new_content = keep.join("\n") + "\n";
    std::fs::write(path, new_content)?;
    Ok(())
}

/// Read the last recorded run state, if any.
pub fn read_run_state(state_dir: &Path) -> Option<RunState> {
    let content = std::fs::read_to_string(state_file_path(state_dir)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Read the last `limit` finished runs, oldest first.
pub fn read_history(state_dir: &Path, limit: usize) -> Vec<RunHistoryEntry> {
    let Ok(content) = std::fs::read_to_string(history_file_path(state_dir)) else {
        return Vec::new();
    };
    let lines: Vec<&str> = content.lines().collect();
    lines[lines.len().saturating_sub(limit)..]
        .iter()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
