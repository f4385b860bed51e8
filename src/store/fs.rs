// src/store/fs.rs — Directory-backed unit store
//
// Lessons: <lessons_dir>/<id>.json
// Reports: <reports_dir>/<id>-report.json

use std::path::{Path, PathBuf};

use super::UnitStore;
use crate::core::types::{Lesson, ReportArtifact};
use crate::infra::errors::GateError;
use crate::util::write_atomic;

const REPORT_SUFFIX: &str = "-report.json";

pub struct FsUnitStore {
    lessons_dir: PathBuf,
    reports_dir: PathBuf,
}

impl FsUnitStore {
    pub fn new(lessons_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            lessons_dir: lessons_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn lessons_dir(&self) -> &Path {
        &self.lessons_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    fn lesson_path(&self, id: &str) -> PathBuf {
        self.lessons_dir.join(format!("{id}.json"))
    }

    pub fn report_path(&self, id: &str) -> PathBuf {
        self.reports_dir.join(format!("{id}{REPORT_SUFFIX}"))
    }
}

/// Sorted file names in `dir` ending with `suffix`, with the suffix removed.
fn stems_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<String>, GateError> {
    let mut stems: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Skip temp files from interrupted atomic writes
            if name.starts_with('.') {
                return None;
            }
            name.strip_suffix(suffix).map(str::to_string)
        })
        .filter(|stem| !stem.is_empty())
        .collect();
    stems.sort();
    Ok(stems)
}

impl UnitStore for FsUnitStore {
    fn list_ids(&self) -> Result<Vec<String>, GateError> {
        if !self.lessons_dir.is_dir() {
            return Err(GateError::EmptyInput(
                self.lessons_dir.display().to_string(),
            ));
        }
        // Reports may share the lessons directory
        Ok(stems_with_suffix(&self.lessons_dir, ".json")?
            .into_iter()
            .filter(|id| !id.ends_with("-report"))
            .collect())
    }

    fn load(&self, id: &str) -> Result<Lesson, GateError> {
        let parse_err = |message: String| GateError::Parse {
            unit: id.to_string(),
            message,
        };

        let content = std::fs::read_to_string(self.lesson_path(id))
            .map_err(|e| parse_err(e.to_string()))?;
        let lesson: Lesson =
            serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?;

        if lesson.segments.is_empty() {
            return Err(parse_err("lesson has no segments".into()));
        }
        if let Some(dup) = lesson.duplicate_segment_id() {
            return Err(parse_err(format!("duplicate segment_id '{dup}'")));
        }
        Ok(lesson)
    }

    fn write_report(&self, id: &str, artifact: &ReportArtifact) -> Result<(), GateError> {
        let json = serde_json::to_string_pretty(artifact)?;
        write_atomic(&self.report_path(id), json.as_bytes())?;
        tracing::debug!(lesson = id, path = %self.report_path(id).display(), "Report written");
        Ok(())
    }

    fn list_reports(&self) -> Result<Vec<(String, ReportArtifact)>, GateError> {
        if !self.reports_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for id in stems_with_suffix(&self.reports_dir, REPORT_SUFFIX)? {
            let path = self.report_path(&id);
            let parsed = std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|c| serde_json::from_str::<ReportArtifact>(&c).map_err(Into::into));
            match parsed {
                Ok(artifact) => reports.push((id, artifact)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable report: {}", e);
                }
            }
        }
        Ok(reports)
    }
}
