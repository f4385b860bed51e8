// src/core/cost.rs — Budget tracking and model pricing
//
// All amounts are held as integer micro-dollars (1 USD = 1_000_000) so that
// hundreds of sub-cent additions never drift.

use crate::provider::TokenUsage;

pub const MICROS_PER_USD: f64 = 1_000_000.0;

/// Convert a USD amount to micro-dollars. Negative and NaN amounts clamp to
/// zero; amounts beyond the representable range saturate at `u64::MAX`.
pub fn usd_to_micros(usd: f64) -> u64 {
    if usd.is_nan() || usd <= 0.0 {
        return 0;
    }
    // `as` saturates for out-of-range floats, including +inf.
    (usd * MICROS_PER_USD).round() as u64
}

pub fn micros_to_usd(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_USD
}

/// Hard spending cap for one batch run.
///
/// Spend only ever grows. The tracker is owned by exactly one orchestrator run.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    spent_micros: u64,
    ceiling_micros: u64,
}

impl BudgetTracker {
    pub fn new(ceiling_usd: f64) -> Self {
        Self {
            spent_micros: 0,
            ceiling_micros: usd_to_micros(ceiling_usd),
        }
    }

    /// A tracker that never reports over-budget.
    pub fn unlimited() -> Self {
        Self {
            spent_micros: 0,
            ceiling_micros: u64::MAX,
        }
    }

    /// Record a non-negative cost. Negative amounts are clamped to zero.
    pub fn add(&mut self, amount_usd: f64) {
        if amount_usd < 0.0 || amount_usd.is_nan() {
            tracing::warn!(amount_usd, "Ignoring invalid cost addition");
            return;
        }
        self.add_micros(usd_to_micros(amount_usd));
    }

    pub fn add_micros(&mut self, micros: u64) {
        self.spent_micros = self.spent_micros.saturating_add(micros);
    }

    pub fn is_over_budget(&self) -> bool {
        self.spent_micros >= self.ceiling_micros
    }

    pub fn total(&self) -> f64 {
        micros_to_usd(self.spent_micros)
    }

    pub fn ceiling(&self) -> f64 {
        micros_to_usd(self.ceiling_micros)
    }

    pub fn spent_micros(&self) -> u64 {
        self.spent_micros
    }

    pub fn remaining(&self) -> f64 {
        micros_to_usd(self.ceiling_micros.saturating_sub(self.spent_micros))
    }

    /// Render spent / ceiling for logging.
    pub fn describe(&self) -> String {
        if self.ceiling_micros == u64::MAX {
            format!("${:.4} / unlimited", self.total())
        } else {
            format!("${:.4} / ${:.2}", self.total(), self.ceiling())
        }
    }
}

impl std::fmt::Display for BudgetTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Cost of one model call in micro-dollars.
///
/// With prices quoted per million tokens, one token at $1/MTok costs exactly
/// one micro-dollar.
pub fn calculate_cost_micros(input_price: f64, output_price: f64, usage: &TokenUsage) -> u64 {
    let micros = usage.input_tokens as f64 * input_price
        + usage.output_tokens as f64 * output_price
        // Cached tokens are cheaper (Anthropic)
        + usage.cache_read_tokens as f64 * (input_price * 0.1)
        + usage.cache_write_tokens as f64 * (input_price * 1.25);
    micros.round().max(0.0) as u64
}

/// Returns (input_price_per_mtok, output_price_per_mtok).
pub fn model_pricing(model: &str) -> (f64, f64) {
    match model {
        m if m.contains("claude-opus") => (15.0, 75.0),
        m if m.contains("claude-sonnet") => (3.0, 15.0),
        m if m.contains("claude-haiku") || m.contains("haiku") => (0.8, 4.0),
        // Unknown: price like a mid-tier model rather than free
        _ => (3.0, 15.0),
    }
}
