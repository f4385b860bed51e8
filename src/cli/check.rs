// src/cli/check.rs — `lessongate check`: run the batch quality gate

use std::fmt::Write as _;
use std::sync::Arc;

use crate::cli::progress::terminal_progress;
use crate::core::orchestrator::{BatchOptions, BatchOrchestrator};
use crate::core::state::state_writer_progress;
use crate::core::types::{BatchEvent, BatchSummary, HaltReason};
use crate::evaluator::estimator::FlatRateEstimator;
use crate::evaluator::judge::LlmEvaluator;
use crate::infra::config::Config;
use crate::infra::errors::GateError;
use crate::infra::paths;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::retry::{RetryConfig, RetryProvider};
use crate::store::FsUnitStore;

/// Command-line overrides for a check run. `None` keeps the config value.
#[derive(Debug, Clone, Default)]
pub struct CheckArgs {
    pub budget: Option<f64>,
    pub sample_rate: Option<usize>,
    pub start_from: Option<String>,
    pub dry_run: bool,
    pub max_rounds: Option<u8>,
    pub breaker_threshold: Option<u32>,
    pub lessons_dir: Option<String>,
    pub reports_dir: Option<String>,
    pub quiet: bool,
}

impl CheckArgs {
    fn apply_to(&self, config: &mut Config) {
        let b = &mut config.batch;
        if let Some(v) = self.budget {
            b.budget_usd = v;
        }
        if let Some(v) = self.sample_rate {
            b.sample_rate = v;
        }
        if let Some(v) = self.max_rounds {
            b.max_rounds = v;
        }
        if let Some(v) = self.breaker_threshold {
            b.breaker_threshold = v;
        }
        if let Some(ref v) = self.lessons_dir {
            b.lessons_dir = v.clone();
        }
        if let Some(ref v) = self.reports_dir {
            b.reports_dir = v.clone();
        }
    }
}

fn api_key() -> Result<String, GateError> {
    std::env::var("ANTHROPIC_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| GateError::MissingEnv("ANTHROPIC_API_KEY".into()))
}

/// Run the batch and print its summary to stdout.
pub async fn run_check(mut config: Config, args: CheckArgs) -> anyhow::Result<BatchSummary> {
    args.apply_to(&mut config);
    config.validate()?;

    let store = Arc::new(FsUnitStore::new(
        &config.batch.lessons_dir,
        &config.batch.reports_dir,
    ));
    let estimator = Arc::new(FlatRateEstimator::new(config.batch.cost_per_check_usd));
    let mut options = BatchOptions::from_config(&config.batch);
    options.start_from = args.start_from.clone();

    let mut orchestrator = if args.dry_run {
        BatchOrchestrator::dry_run(store, estimator, options)
    } else {
        let anthropic = Arc::new(AnthropicProvider::new(api_key()?));
        let provider = Arc::new(RetryProvider::with_config(
            anthropic,
            RetryConfig {
                max_retries: config.evaluator.provider_retries,
                ..RetryConfig::default()
            },
        ));
        let evaluator = Arc::new(LlmEvaluator::new(provider, &config.evaluator));
        BatchOrchestrator::new(store, evaluator, estimator, options)
    };

    let terminal: Option<Box<dyn Fn(BatchEvent) + Send>> = if args.quiet {
        None
    } else {
        Some(Box::new(terminal_progress()))
    };
    // Dry runs must not clobber the resume point of a real run
    orchestrator = if args.dry_run {
        match terminal {
            Some(cb) => orchestrator.with_progress(cb),
            None => orchestrator,
        }
    } else {
        orchestrator.with_progress(state_writer_progress(paths::state_dir(), terminal))
    };

    // First Ctrl-C: finish the current lesson and stop. Second: abandon it.
    let stop = orchestrator.stop_token();
    let abort = orchestrator.abort_token();
    let signals = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nStopping after the current lesson (Ctrl-C again to abort)...");
        stop.cancel();
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("Aborting.");
        abort.cancel();
    });

    let result = orchestrator.run().await;
    signals.abort();
    let summary = result?;

    print!("{}", format_summary(&summary));
    Ok(summary)
}

/// Human-readable end-of-run report.
pub fn format_summary(summary: &BatchSummary) -> String {
    let t = &summary.tally;
    let mut out = String::new();

    let title = if summary.dry_run {
        "Quality check (dry run)"
    } else {
        "Quality check"
    };
    let _ = writeln!(out, "{}  run {}", title, summary.run_id);

    if summary.dry_run {
        let _ = writeln!(out, "  Simulated:          {}", t.simulated);
        let _ = writeln!(out, "  Would sample:       {}", t.would_sample);
    } else {
        let _ = writeln!(out, "  Approved:           {}", t.approved);
        let _ = writeln!(out, "  Manual review:      {}", t.forced_manual_review);
        let _ = writeln!(out, "  Revision needed:    {}", t.revision_needed);
        let _ = writeln!(out, "  Rejected:           {}", t.rejected);
        let _ = writeln!(out, "  Evaluator failures: {}", t.evaluator_failed);
    }
    let _ = writeln!(out, "  Parse failures:     {}", t.parse_failed);
    let _ = writeln!(
        out,
        "  Spent:              ${:.4} / ${:.2}",
        summary.spent_usd, summary.budget_usd
    );
    let _ = writeln!(out, "  Processed:          {}", summary.processed);

    if summary.halt_reason != HaltReason::Completed {
        let _ = writeln!(
            out,
            "  Halted:             {} ({} pending)",
            summary.halt_reason, summary.pending
        );
        if let Some(ref id) = summary.resume_from {
            let _ = writeln!(out, "  Resume with:        --start-from {}", id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BatchTally, UnitOutcome};

    fn summary(halt_reason: HaltReason) -> BatchSummary {
        let mut tally = BatchTally::default();
        tally.record(UnitOutcome::Approved);
        tally.record(UnitOutcome::ForcedManualReview);
        BatchSummary {
            run_id: "run-1".into(),
            dry_run: false,
            tally,
            spent_usd: 0.16,
            budget_usd: 3.0,
            halt_reason,
            processed: 2,
            pending: 5,
            resume_from: Some("lesson-01-03".into()),
            outcomes: vec![],
        }
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::default();
        CheckArgs {
            budget: Some(7.5),
            sample_rate: Some(3),
            lessons_dir: Some("in".into()),
            ..CheckArgs::default()
        }
        .apply_to(&mut config);
        assert_eq!(config.batch.budget_usd, 7.5);
        assert_eq!(config.batch.sample_rate, 3);
        assert_eq!(config.batch.lessons_dir, "in");
        // Untouched fields keep config values
        assert_eq!(config.batch.max_rounds, 2);
        assert_eq!(config.batch.reports_dir, "output/reports");
    }

    #[test]
    fn test_summary_halted_shows_resume() {
        let text = format_summary(&summary(HaltReason::Breaker));
        assert!(text.contains("Approved:           1"));
        assert!(text.contains("Manual review:      1"));
        assert!(text.contains("Spent:              $0.1600 / $3.00"));
        assert!(text.contains("circuit breaker open (5 pending)"));
        assert!(text.contains("--start-from lesson-01-03"));
    }

    #[test]
    fn test_summary_completed_has_no_halt_line() {
        let text = format_summary(&summary(HaltReason::Completed));
        assert!(!text.contains("Halted"));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_anything_runs() {
        let mut config = Config::default();
        config.batch.lessons_dir = "/nonexistent/lessons".into();
        let args = CheckArgs {
            sample_rate: Some(0),
            dry_run: true,
            quiet: true,
            ..CheckArgs::default()
        };
        let err = run_check(config, args).await.unwrap_err();
        let gate = err.downcast_ref::<GateError>().unwrap();
        assert!(matches!(gate, GateError::Config(_)));
    }
}
