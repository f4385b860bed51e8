// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::infra::errors::GateError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Hard spending cap for one run, in USD.
    pub budget_usd: f64,
    /// Force manual review every N units (index 0 always sampled).
    pub sample_rate: usize,
    /// Consecutive evaluator failures before the batch halts.
    pub breaker_threshold: u32,
    /// Evaluate/auto-fix rounds per unit.
    pub max_rounds: u8,
    /// Courtesy delay between successful evaluator calls.
    pub inter_unit_delay_ms: u64,
    /// Estimated cost of one check, used in dry-run and when the evaluator
    /// does not report actual spend.
    pub cost_per_check_usd: f64,
    pub lessons_dir: String,
    pub reports_dir: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            budget_usd: 3.0,
            sample_rate: 5,
            breaker_threshold: 3,
            max_rounds: 2,
            inter_unit_delay_ms: 2_000,
            cost_per_check_usd: 0.08,
            lessons_dir: "output/lessons".into(),
            reports_dir: "output/reports".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Attempts per evaluation (call + parse + validate) before giving up.
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Transient HTTP retries inside the provider.
    pub provider_retries: u32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".into(),
            max_tokens: 4096,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            provider_retries: 3,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject values that would make a run meaningless. Called before any unit is processed.
    pub fn validate(&self) -> Result<(), GateError> {
        let b = &self.batch;
        if !b.budget_usd.is_finite() || b.budget_usd < 0.01 {
            return Err(GateError::Config(format!(
                "budget must be a finite amount >= 0.01, got {}",
                b.budget_usd
            )));
        }
        if b.sample_rate < 1 {
            return Err(GateError::Config("sample_rate must be >= 1".into()));
        }
        if b.breaker_threshold < 1 {
            return Err(GateError::Config("breaker_threshold must be >= 1".into()));
        }
        if b.max_rounds < 1 {
            return Err(GateError::Config("max_rounds must be >= 1".into()));
        }
        if !b.cost_per_check_usd.is_finite() || b.cost_per_check_usd < 0.0 {
            return Err(GateError::Config(format!(
                "cost_per_check_usd must be >= 0, got {}",
                b.cost_per_check_usd
            )));
        }
        if self.evaluator.max_attempts < 1 {
            return Err(GateError::Config("evaluator.max_attempts must be >= 1".into()));
        }
        Ok(())
    }
}
