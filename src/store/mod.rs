// src/store/mod.rs — Lesson and report persistence

pub mod fs;

use crate::core::types::{Lesson, ReportArtifact};
use crate::infra::errors::GateError;

pub use fs::FsUnitStore;

/// Where lessons come from and where their reports go.
///
/// `list_ids` fixes the processing order for a batch. It must be
/// deterministic so that a resume point means the same thing across runs.
#[cfg_attr(test, mockall::automock)]
pub trait UnitStore: Send + Sync {
    fn list_ids(&self) -> Result<Vec<String>, GateError>;

    /// Unreadable or malformed lessons surface as `GateError::Parse`.
    fn load(&self, id: &str) -> Result<Lesson, GateError>;

    /// Must be durable on `Ok`.
    fn write_report(&self, id: &str, artifact: &ReportArtifact) -> Result<(), GateError>;

    /// Every readable report, keyed by lesson id, in id order.
    fn list_reports(&self) -> Result<Vec<(String, ReportArtifact)>, GateError>;
}
