pub mod bundle;
pub mod html;
pub mod json;
pub mod markdown;
pub mod terminal;

use crate::model::AnalysisResult;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Result type for report operations
pub type ReportResult<T> = Result<T, ReportError>;

/// Errors that can occur during report generation
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template error: {0}")]
    Template(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tera::Error> for ReportError {
    fn from(err: tera::Error) -> Self {
        ReportError::Template(err.to_string())
    }
}

/// Where and how a run's reports are persisted.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub directory: PathBuf,
    /// Also render the Markdown report to a standalone HTML file.
    pub html: bool,
    /// Also bundle the report files into a `.tar.gz`.
    pub archive: bool,
}

impl ReportOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            html: false,
            archive: false,
        }
    }
}

/// Paths produced by one report write.
#[derive(Debug, Clone)]
pub struct WrittenReports {
    pub markdown_path: PathBuf,
    pub json_path: PathBuf,
    pub html_path: Option<PathBuf>,
    pub bundle_path: Option<PathBuf>,
}

/// Writes the per-run report files with the deterministic naming scheme
/// `<workspace>_connectivity_<YYYYMMDD>_<HHMMSS>.{md,json}`.
pub struct ReportSet {
    options: ReportOptions,
}

impl ReportSet {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    pub fn write(&self, result: &AnalysisResult) -> ReportResult<WrittenReports> {
        fs::create_dir_all(&self.options.directory)?;

        let stem = report_stem(result);
        let markdown_path = self.options.directory.join(format!("{}.md", stem));
        let json_path = self.options.directory.join(format!("{}.json", stem));

        let markdown_content = markdown::render(result)?;
        fs::write(&markdown_path, &markdown_content)?;
        json::write(result, &json_path)?;

        let html_path = if self.options.html {
            let path = self.options.directory.join(format!("{}.html", stem));
            fs::write(&path, html::render(&markdown_content))?;
            Some(path)
        } else {
            None
        };

        let bundle_path = if self.options.archive {
            let path = self.options.directory.join(format!("{}.tar.gz", stem));
            let mut members: Vec<&Path> = vec![&markdown_path, &json_path];
            if let Some(html) = &html_path {
                members.push(html);
            }
            bundle::create(&members, &path)?;
            Some(path)
        } else {
            None
        };

        info!(
            "wrote report files {}.md / {}.json to {}",
            stem,
            stem,
            self.options.directory.display()
        );
        Ok(WrittenReports {
            markdown_path,
            json_path,
            html_path,
            bundle_path,
        })
    }
}

/// Filename stem for a run's report files.
pub fn report_stem(result: &AnalysisResult) -> String {
    format!(
        "{}_connectivity_{}",
        result.session.workspace_name,
        result.session.started_at.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisSession, AnalysisStep, StepOutcome, WorkspaceKind};
    use chrono::TimeZone;

    fn sample_result() -> AnalysisResult {
        let mut session = AnalysisSession::new("ws", "rg", None, WorkspaceKind::MlWorkspace);
        session.started_at = chrono::Utc.with_ymd_and_hms(2026, 8, 6, 14, 30, 5).unwrap();
        AnalysisResult {
            session,
            network_configuration: None,
            connected_resources: Vec::new(),
            security_summary: None,
            step_outcomes: AnalysisStep::ALL
                .iter()
                .map(|s| StepOutcome::pending(*s))
                .collect(),
            success: false,
        }
    }

    #[test]
    fn stem_combines_workspace_and_timestamp() {
        let result = sample_result();
        assert_eq!(report_stem(&result), "ws_connectivity_20260806_143005");
    }

    #[test]
    fn write_produces_markdown_and_json_pair() {
        let dir = tempfile::tempdir().unwrap();
        let set = ReportSet::new(ReportOptions::new(dir.path()));
        let written = set.write(&sample_result()).unwrap();

        assert!(written.markdown_path.exists());
        assert!(written.json_path.exists());
        assert!(written.html_path.is_none());
        assert_eq!(
            written.markdown_path.file_name().unwrap().to_str().unwrap(),
            "ws_connectivity_20260806_143005.md"
        );
    }

    #[test]
    fn optional_html_and_bundle_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let options = ReportOptions {
            directory: dir.path().to_path_buf(),
            html: true,
            archive: true,
        };
        let written = ReportSet::new(options).write(&sample_result()).unwrap();

        assert!(written.html_path.unwrap().exists());
        assert!(written.bundle_path.unwrap().exists());
    }
}
