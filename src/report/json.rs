use super::ReportResult;
use crate::model::AnalysisResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Serialize the result with its stable field order. Struct field order
/// carries through serde, so the document's top-level keys are always
/// `session`, `network_configuration`, `connected_resources`,
/// `security_summary`, `step_outcomes`, `success` — diffable across runs.
pub fn render(result: &AnalysisResult) -> ReportResult<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// Write the structured document to a file.
pub fn write(result: &AnalysisResult, path: &Path) -> ReportResult<()> {
    let json = render(result)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
