// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A generated lesson script: an ordered list of segments plus fields this
/// crate never looks at (course id, title, quiz, metadata, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub lesson_id: String,
    pub segments: Vec<Segment>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An addressable part of a lesson. Only `script` is ever rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: String,
    #[serde(rename = "script_zh", alias = "script")]
    pub script: String,
    /// Duration, visual notes, slide content, etc.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Lesson {
    pub fn segment_mut(&mut self, segment_id: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.segment_id == segment_id)
    }

    /// Returns the first duplicated segment id, if any.
    pub fn duplicate_segment_id(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.segments
            .iter()
            .map(|s| s.segment_id.as_str())
            .find(|id| !seen.insert(*id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    RevisionNeeded,
    Rejected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Approved => write!(f, "approved"),
            Verdict::RevisionNeeded => write!(f, "revision_needed"),
            Verdict::Rejected => write!(f, "rejected"),
        }
    }
}

/// The seven fixed review dimensions, each scored 1-10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(rename = "口語自然度")]
    pub spoken_naturalness: u8,
    #[serde(rename = "專業正確性")]
    pub professional_accuracy: u8,
    #[serde(rename = "教學結構")]
    pub teaching_structure: u8,
    #[serde(rename = "案例實用性")]
    pub case_practicality: u8,
    #[serde(rename = "字數節奏")]
    pub pacing: u8,
    #[serde(rename = "視覺指示")]
    pub visual_directions: u8,
    #[serde(rename = "測驗品質")]
    pub quiz_quality: u8,
}

impl ScoreBreakdown {
    /// All seven scores in a uniform shape: (json key, score).
    pub fn entries(&self) -> [(&'static str, u8); 7] {
        [
            ("口語自然度", self.spoken_naturalness),
            ("專業正確性", self.professional_accuracy),
            ("教學結構", self.teaching_structure),
            ("案例實用性", self.case_practicality),
            ("字數節奏", self.pacing),
            ("視覺指示", self.visual_directions),
            ("測驗品質", self.quiz_quality),
        ]
    }

    pub fn uniform(score: u8) -> Self {
        Self {
            spoken_naturalness: score,
            professional_accuracy: score,
            teaching_structure: score,
            case_practicality: score,
            pacing: score,
            visual_directions: score,
            quiz_quality: score,
        }
    }
}

/// One flaw found by the evaluator, with an exact text-level fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub segment_id: String,
    /// Human-readable description.
    pub issue: String,
    pub original_text: String,
    #[serde(default)]
    pub suggestion: String,
    pub revised_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub lesson_id: String,
    pub overall_score: f64,
    pub scores: ScoreBreakdown,
    #[serde(default)]
    pub issues: Vec<QualityIssue>,
    #[serde(default)]
    pub general_feedback: String,
    pub verdict: Verdict,
}

impl QualityReport {
    pub fn high_issue_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::High)
            .count()
    }
}

/// Per-unit state of the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Checking,
    FixApplied,
    Approved,
    Rejected,
    Stuck,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateState::Checking => write!(f, "checking"),
            GateState::FixApplied => write!(f, "fix_applied"),
            GateState::Approved => write!(f, "approved"),
            GateState::Rejected => write!(f, "rejected"),
            GateState::Stuck => write!(f, "stuck"),
        }
    }
}

/// Result of applying a report's fixes to a lesson.
#[derive(Debug, Clone)]
pub struct FixResult {
    pub fixed: Lesson,
    pub applied_count: usize,
    pub remaining_high_issues: usize,
}

/// Result of the evaluate/auto-fix round loop for one lesson.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub final_lesson: Lesson,
    /// Report from the last completed round.
    pub final_report: QualityReport,
    pub rounds: u8,
    pub state: GateState,
    /// Fixes applied across all rounds.
    pub fixes_applied: usize,
}

/// Round loop outcome after the sampling override.
#[derive(Debug, Clone)]
pub struct SampledOutcome {
    pub final_lesson: Lesson,
    pub final_report: QualityReport,
    pub rounds: u8,
    pub state: GateState,
    pub fixes_applied: usize,
    pub forced_manual_review: bool,
}

/// What gets persisted for each evaluated unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifact {
    #[serde(flatten)]
    pub report: QualityReport,
    pub forced_manual_review: bool,
    pub rounds: u8,
    pub final_state: GateState,
    pub fixes_applied: usize,
    pub checked_at: DateTime<Utc>,
}

impl ReportArtifact {
    pub fn from_outcome(outcome: &SampledOutcome) -> Self {
        Self {
            report: outcome.final_report.clone(),
            forced_manual_review: outcome.forced_manual_review,
            rounds: outcome.rounds,
            final_state: outcome.state,
            fixes_applied: outcome.fixes_applied,
            checked_at: Utc::now(),
        }
    }
}

/// Which tally bucket a unit ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Approved,
    RevisionNeeded,
    Rejected,
    ForcedManualReview,
    ParseFailed,
    EvaluatorFailed,
    /// Dry-run only.
    Simulated { would_sample: bool },
}

impl UnitOutcome {
    pub fn from_sampled(outcome: &SampledOutcome) -> Self {
        if outcome.forced_manual_review {
            return UnitOutcome::ForcedManualReview;
        }
        match outcome.final_report.verdict {
            Verdict::Approved => UnitOutcome::Approved,
            Verdict::RevisionNeeded => UnitOutcome::RevisionNeeded,
            Verdict::Rejected => UnitOutcome::Rejected,
        }
    }
}

impl std::fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitOutcome::Approved => write!(f, "approved"),
            UnitOutcome::RevisionNeeded => write!(f, "revision_needed"),
            UnitOutcome::Rejected => write!(f, "rejected"),
            UnitOutcome::ForcedManualReview => write!(f, "manual_review"),
            UnitOutcome::ParseFailed => write!(f, "parse_failed"),
            UnitOutcome::EvaluatorFailed => write!(f, "evaluator_failed"),
            UnitOutcome::Simulated { would_sample: true } => write!(f, "simulated (sampled)"),
            UnitOutcome::Simulated { would_sample: false } => write!(f, "simulated"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTally {
    pub approved: usize,
    pub revision_needed: usize,
    pub rejected: usize,
    pub forced_manual_review: usize,
    pub parse_failed: usize,
    pub evaluator_failed: usize,
    pub simulated: usize,
    pub would_sample: usize,
}

impl BatchTally {
    pub fn record(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Approved => self.approved += 1,
            UnitOutcome::RevisionNeeded => self.revision_needed += 1,
            UnitOutcome::Rejected => self.rejected += 1,
            UnitOutcome::ForcedManualReview => self.forced_manual_review += 1,
            UnitOutcome::ParseFailed => self.parse_failed += 1,
            UnitOutcome::EvaluatorFailed => self.evaluator_failed += 1,
            UnitOutcome::Simulated { would_sample } => {
                self.simulated += 1;
                if would_sample {
                    self.would_sample += 1;
                }
            }
        }
    }

    /// Units that reached a final bucket.
    pub fn total(&self) -> usize {
        self.approved
            + self.revision_needed
            + self.rejected
            + self.forced_manual_review
            + self.parse_failed
            + self.evaluator_failed
            + self.simulated
    }
}

/// Why a batch run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Completed,
    Budget,
    Breaker,
    /// Graceful stop requested between units.
    Interrupted,
    /// Forceful stop; the in-flight unit was abandoned unpersisted.
    Aborted,
    /// A report could not be written; that unit stays pending.
    Storage,
}

impl HaltReason {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, HaltReason::Interrupted | HaltReason::Aborted)
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::Completed => write!(f, "end of list"),
            HaltReason::Budget => write!(f, "budget cap reached"),
            HaltReason::Breaker => write!(f, "circuit breaker open"),
            HaltReason::Interrupted => write!(f, "interrupted"),
            HaltReason::Aborted => write!(f, "aborted"),
            HaltReason::Storage => write!(f, "report write failed"),
        }
    }
}

/// Final result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub dry_run: bool,
    pub tally: BatchTally,
    pub spent_usd: f64,
    pub budget_usd: f64,
    pub halt_reason: HaltReason,
    /// Units consumed in this run (a contiguous prefix starting at the resume point).
    pub processed: usize,
    /// Units left unprocessed.
    pub pending: usize,
    /// First unprocessed unit; pass it as the resume point to continue.
    pub resume_from: Option<String>,
    /// Per-unit outcomes in list order.
    pub outcomes: Vec<(String, UnitOutcome)>,
}

/// Real-time progress events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started {
        run_id: String,
        total: usize,
        start_index: usize,
        dry_run: bool,
    },
    UnitStart {
        position: usize,
        total: usize,
        unit_id: String,
    },
    UnitDone {
        unit_id: String,
        outcome: UnitOutcome,
        rounds: u8,
        score: Option<f64>,
        spent_usd: f64,
    },
    UnitFailed {
        unit_id: String,
        outcome: UnitOutcome,
        error: String,
        consecutive_failures: u32,
    },
    Halted {
        reason: HaltReason,
        resume_from: Option<String>,
    },
    Complete {
        summary: BatchSummary,
    },
}
