use super::{ReportError, ReportResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Bundle a run's report files into a single `.tar.gz` for handoff.
pub fn create(members: &[&Path], output: &Path) -> ReportResult<()> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for member in members {
        let name = member
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ReportError::Template(format!("invalid bundle member path: {}", member.display()))
            })?;
        let mut source = File::open(member)?;
        archive.append_file(name, &mut source)?;
    }

    let encoder = archive.into_inner()?;
    encoder.finish()?;
    info!("report bundle written to {}", output.display());
    Ok(())
}
