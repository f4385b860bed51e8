// src/evaluator/parser.rs — Lenient extraction of the JSON report from model output

use crate::core::scoring::validate_report;
use crate::core::types::QualityReport;

/// Strip markdown code fences and surrounding whitespace.
///
/// Returns `None` for empty output and for HTML error pages that some
/// gateways return in place of a model response.
pub fn extract_json(text: &str) -> Option<&str> {
    let mut cleaned = text.trim();

    if let Some(rest) = cleaned.strip_prefix("```") {
        // Drop an optional language tag on the fence line
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        cleaned = rest;
    }
    if let Some(rest) = cleaned.trim_end().strip_suffix("```") {
        cleaned = rest;
    }
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return None;
    }
    let lower = cleaned
        .get(..14)
        .unwrap_or(cleaned)
        .to_ascii_lowercase();
    if lower.starts_with("<!doctype") || lower.starts_with("<html") {
        return None;
    }
    Some(cleaned)
}

/// Parse and validate a report from raw model output.
pub fn parse_report(text: &str) -> anyhow::Result<QualityReport> {
    let json = extract_json(text)
        .ok_or_else(|| anyhow::anyhow!("Response contained no JSON payload"))?;
    let report: QualityReport = serde_json::from_str(json)
        .map_err(|e| anyhow::anyhow!("Failed to parse report JSON: {}", e))?;
    validate_report(&report)
        .map_err(|problems| anyhow::anyhow!("Inconsistent report: {}", problems.join("; ")))?;
    Ok(report)
}
