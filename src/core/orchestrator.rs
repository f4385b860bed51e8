// src/core/orchestrator.rs — Batch driver: budget, breaker, sampling, resume

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::cost::BudgetTracker;
use super::safety::CircuitBreaker;
use super::sampling::{quality_check_with_sampling, should_force_manual_review, GateOptions};
use super::types::*;
use crate::evaluator::{CostEstimator, Evaluator};
use crate::infra::config::BatchConfig;
use crate::infra::errors::GateError;
use crate::store::UnitStore;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub budget_usd: f64,
    pub breaker_threshold: u32,
    pub gate: GateOptions,
    /// Pause after each successful evaluation (live mode only).
    pub inter_unit_delay: Duration,
    /// Resume point: id of the first unit to process.
    pub start_from: Option<String>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

impl BatchOptions {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            budget_usd: config.budget_usd,
            breaker_threshold: config.breaker_threshold,
            gate: GateOptions {
                max_rounds: config.max_rounds,
                sample_rate: config.sample_rate,
            },
            inter_unit_delay: Duration::from_millis(config.inter_unit_delay_ms),
            start_from: None,
        }
    }
}

enum Mode {
    Live {
        evaluator: Arc<dyn Evaluator>,
        estimator: Arc<dyn CostEstimator>,
    },
    DryRun {
        estimator: Arc<dyn CostEstimator>,
    },
}

/// Drives every lesson in a store through the quality gate, one at a time.
///
/// The budget tracker and circuit breaker are owned by this instance; two
/// orchestrators never share them.
pub struct BatchOrchestrator {
    store: Arc<dyn UnitStore>,
    mode: Mode,
    options: BatchOptions,
    budget: BudgetTracker,
    breaker: CircuitBreaker,
    /// Checked between units and during the inter-unit delay.
    stop: CancellationToken,
    /// Also races the in-flight evaluator call.
    abort: CancellationToken,
    on_progress: Option<Box<dyn Fn(BatchEvent) + Send>>,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn UnitStore>,
        evaluator: Arc<dyn Evaluator>,
        estimator: Arc<dyn CostEstimator>,
        options: BatchOptions,
    ) -> Self {
        Self::with_mode(store, Mode::Live { evaluator, estimator }, options)
    }

    /// Same loop and gates, but costs come from the estimator and nothing is
    /// evaluated or written.
    pub fn dry_run(
        store: Arc<dyn UnitStore>,
        estimator: Arc<dyn CostEstimator>,
        options: BatchOptions,
    ) -> Self {
        Self::with_mode(store, Mode::DryRun { estimator }, options)
    }

    fn with_mode(store: Arc<dyn UnitStore>, mode: Mode, options: BatchOptions) -> Self {
        Self {
            budget: BudgetTracker::new(options.budget_usd),
            breaker: CircuitBreaker::new(options.breaker_threshold),
            store,
            mode,
            options,
            stop: CancellationToken::new(),
            abort: CancellationToken::new(),
            on_progress: None,
        }
    }

    /// Use externally owned stop/abort tokens (e.g. wired to Ctrl-C).
    pub fn with_cancellation(mut self, stop: CancellationToken, abort: CancellationToken) -> Self {
        self.stop = stop;
        self.abort = abort;
        self
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(BatchEvent) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn is_dry_run(&self) -> bool {
        matches!(self.mode, Mode::DryRun { .. })
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    /// Index of the first unit to process.
    fn start_index(&self, ids: &[String]) -> Result<usize, GateError> {
        match self.options.start_from {
            None => Ok(0),
            Some(ref id) => ids
                .iter()
                .position(|candidate| candidate == id)
                .ok_or_else(|| GateError::UnitNotFound(id.clone())),
        }
    }

    /// Why the batch must stop before touching the next unit, if it must.
    fn halt_check(&self) -> Option<HaltReason> {
        if self.abort.is_cancelled() {
            Some(HaltReason::Aborted)
        } else if self.stop.is_cancelled() {
            Some(HaltReason::Interrupted)
        } else if self.budget.is_over_budget() {
            Some(HaltReason::Budget)
        } else if self.breaker.is_open() {
            Some(HaltReason::Breaker)
        } else {
            None
        }
    }

    /// Process the batch until the list ends or a halt condition fires.
    ///
    /// Every halt, including a failed report write, is a successful return
    /// carrying the tally and resume point. Only setup errors are `Err`.
    pub async fn run(&mut self) -> Result<BatchSummary, GateError> {
        let ids = self.store.list_ids()?;
        if ids.is_empty() {
            return Err(GateError::EmptyInput("lesson store".into()));
        }
        let start_index = self.start_index(&ids)?;
        let total = ids.len();
        let run_id = uuid::Uuid::new_v4().to_string();
        let dry_run = self.is_dry_run();

        tracing::info!(
            run_id = %run_id,
            total,
            start_index,
            dry_run,
            budget = %self.budget,
            "Batch started"
        );
        self.emit(BatchEvent::Started {
            run_id: run_id.clone(),
            total,
            start_index,
            dry_run,
        });

        let mut tally = BatchTally::default();
        let mut outcomes = Vec::new();
        let mut halt_reason = HaltReason::Completed;
        let mut next_index = total;

        for index in start_index..total {
            if let Some(reason) = self.halt_check() {
                halt_reason = reason;
                next_index = index;
                break;
            }

            let id = &ids[index];
            self.emit(BatchEvent::UnitStart {
                position: index + 1,
                total,
                unit_id: id.clone(),
            });

            let lesson = match self.store.load(id) {
                Ok(lesson) => lesson,
                Err(e) => {
                    tracing::warn!(unit = %id, "Skipping unit: {}", e);
                    tally.record(UnitOutcome::ParseFailed);
                    outcomes.push((id.clone(), UnitOutcome::ParseFailed));
                    self.emit(BatchEvent::UnitFailed {
                        unit_id: id.clone(),
                        outcome: UnitOutcome::ParseFailed,
                        error: e.to_string(),
                        consecutive_failures: self.breaker.failure_count(),
                    });
                    continue;
                }
            };

            let (evaluator, estimator) = match &self.mode {
                Mode::DryRun { estimator } => {
                    let cost = estimator.estimate(&lesson);
                    self.budget.add(cost);
                    self.breaker.record_success();
                    let outcome = UnitOutcome::Simulated {
                        would_sample: should_force_manual_review(
                            index,
                            self.options.gate.sample_rate,
                        ),
                    };
                    tally.record(outcome);
                    outcomes.push((id.clone(), outcome));
                    tracing::debug!(unit = %id, cost, budget = %self.budget, "Simulated check");
                    self.emit(BatchEvent::UnitDone {
                        unit_id: id.clone(),
                        outcome,
                        rounds: 0,
                        score: None,
                        spent_usd: self.budget.total(),
                    });
                    continue;
                }
                Mode::Live {
                    evaluator,
                    estimator,
                } => (evaluator.clone(), estimator.clone()),
            };

            let check =
                quality_check_with_sampling(&lesson, index, evaluator.as_ref(), self.options.gate);
            let result = tokio::select! {
                biased;
                _ = self.abort.cancelled() => None,
                r = check => Some(r),
            };

            let Some(result) = result else {
                // Abandoned mid-call: nothing persisted, unit stays pending
                if let Some(spent) = evaluator.take_spend() {
                    self.budget.add(spent);
                }
                tracing::warn!(unit = %id, "Evaluation aborted");
                halt_reason = HaltReason::Aborted;
                next_index = index;
                break;
            };

            match result {
                Ok(sampled) => {
                    let cost = evaluator
                        .take_spend()
                        .unwrap_or_else(|| estimator.estimate(&lesson));
                    self.budget.add(cost);

                    let artifact = ReportArtifact::from_outcome(&sampled);
                    if let Err(e) = self.store.write_report(id, &artifact) {
                        // Spend stays charged; the unit is redone on resume
                        tracing::error!(unit = %id, "Could not write report: {}", e);
                        halt_reason = HaltReason::Storage;
                        next_index = index;
                        break;
                    }
                    self.breaker.record_success();

                    let outcome = UnitOutcome::from_sampled(&sampled);
                    tally.record(outcome);
                    outcomes.push((id.clone(), outcome));

                    tracing::info!(
                        unit = %id,
                        outcome = %outcome,
                        rounds = sampled.rounds,
                        score = sampled.final_report.overall_score,
                        budget = %self.budget,
                        "Unit done"
                    );
                    self.emit(BatchEvent::UnitDone {
                        unit_id: id.clone(),
                        outcome,
                        rounds: sampled.rounds,
                        score: Some(sampled.final_report.overall_score),
                        spent_usd: self.budget.total(),
                    });

                    if index + 1 < total && !self.options.inter_unit_delay.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(self.options.inter_unit_delay) => {}
                            _ = self.stop.cancelled() => {}
                            _ = self.abort.cancelled() => {}
                        }
                    }
                }
                Err(e) => {
                    // Spend on a failed call is still real money
                    if let Some(spent) = evaluator.take_spend() {
                        self.budget.add(spent);
                    }
                    self.breaker.record_failure();
                    tally.record(UnitOutcome::EvaluatorFailed);
                    outcomes.push((id.clone(), UnitOutcome::EvaluatorFailed));

                    tracing::warn!(
                        unit = %id,
                        consecutive_failures = self.breaker.failure_count(),
                        "Evaluator failed: {:#}",
                        e
                    );
                    self.emit(BatchEvent::UnitFailed {
                        unit_id: id.clone(),
                        outcome: UnitOutcome::EvaluatorFailed,
                        error: format!("{:#}", e),
                        consecutive_failures: self.breaker.failure_count(),
                    });
                }
            }
        }

        let resume_from = ids.get(next_index).cloned();
        if halt_reason != HaltReason::Completed {
            tracing::info!(
                reason = %halt_reason,
                resume_from = resume_from.as_deref().unwrap_or("-"),
                "Batch halted"
            );
            self.emit(BatchEvent::Halted {
                reason: halt_reason,
                resume_from: resume_from.clone(),
            });
        }

        let summary = BatchSummary {
            run_id,
            dry_run,
            tally,
            spent_usd: self.budget.total(),
            budget_usd: self.budget.ceiling(),
            halt_reason,
            processed: next_index - start_index,
            pending: total - next_index,
            resume_from,
            outcomes,
        };
        self.emit(BatchEvent::Complete {
            summary: summary.clone(),
        });
        Ok(summary)
    }
}
