// src/infra/errors.rs — Error types for lessongate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    // Provider errors (retriable)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Evaluator failed for '{unit}': {message}")]
    Evaluator { unit: String, message: String },

    // Unit errors (recovered per unit, never feed the breaker)
    #[error("Failed to parse unit '{unit}': {message}")]
    Parse { unit: String, message: String },

    // Setup errors (fatal before any unit is processed)
    #[error("Missing environment variables: {0}")]
    MissingEnv(String),

    #[error("No lessons found in {0}")]
    EmptyInput(String),

    #[error("Unit '{0}' not found in the batch")]
    UnitNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Infra
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GateError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            GateError::Provider {
                retriable: true,
                ..
            } | GateError::RateLimited { .. }
        )
    }

    /// Setup errors abort the batch before any unit is touched.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            GateError::MissingEnv(_)
                | GateError::EmptyInput(_)
                | GateError::UnitNotFound(_)
                | GateError::Config(_)
        )
    }
}
