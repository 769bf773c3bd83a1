//! One-shot import from a removable volume.

use crate::error::{IngestError, Result};
use crate::pipeline::{FileReport, IngestContext};
use crate::retry::RetryPolicy;
use crate::volume::{is_hidden, locate_with_retry, VolumeLocator};
use scoutwatch_db::StoreConnector;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub volume: PathBuf,
    pub files: Vec<FileReport>,
    pub files_failed: usize,
}

impl ImportReport {
    pub fn forms_stored(&self) -> usize {
        self.files.iter().map(|f| f.forms_stored).sum()
    }
}

/// Wait for a volume, then ingest every regular file at its root in name
/// order. Imported files are not backed up again.
///
/// Stops at the first store outage; unreadable files are skipped.
pub async fn import_from_volume<C, L, V>(
    ctx: &mut IngestContext<C, L>,
    locator: &V,
    policy: &RetryPolicy,
) -> Result<ImportReport>
where
    C: StoreConnector,
    L: VolumeLocator,
    V: VolumeLocator + ?Sized,
{
    ctx.log.info("Looking for USB drive");
    let volume = match locate_with_retry(locator, policy, &ctx.cancel).await {
        Ok(volume) => volume,
        Err(e) => {
            ctx.log.error(format!("USB import failed: {}", e));
            return Err(e);
        }
    };
    ctx.log.info(format!("Importing from {}", volume.display()));

    let files = list_files(&volume)?;
    let mut report = ImportReport {
        volume,
        files: Vec::with_capacity(files.len()),
        files_failed: 0,
    };

    for path in files {
        if ctx.cancel.is_cancelled() {
            ctx.log.warn("USB import cancelled");
            break;
        }
        match ctx.ingest_file(&path, false).await {
            Ok(file) => report.files.push(file),
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => report.files_failed += 1,
        }
    }

    ctx.log.info(format!(
        "USB import finished: {} file(s), {} form(s) stored",
        report.files.len(),
        report.forms_stored()
    ));
    Ok(report)
}

fn list_files(volume: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(volume).map_err(|e| IngestError::io(volume, e))? {
        let entry = entry.map_err(|e| IngestError::io(volume, e))?;
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && !is_hidden(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lists_regular_files_by_name() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tablet2"), "").unwrap();
        fs::write(temp.path().join("tablet10"), "").unwrap();
        fs::write(temp.path().join(".Trashes"), "").unwrap();
        fs::create_dir(temp.path().join("System Volume Information")).unwrap();

        let files = list_files(temp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["tablet10", "tablet2"]);
    }
}
