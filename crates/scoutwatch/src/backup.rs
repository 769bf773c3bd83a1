//! Verbatim backup of ingested files onto a removable volume.

use crate::cancel::CancellationToken;
use crate::error::{IngestError, Result};
use crate::retry::RetryPolicy;
use crate::volume::{locate_with_retry, VolumeLocator};
use std::fs;
use std::path::{Path, PathBuf};

pub const BACKUP_FILE_PREFIX: &str = "scoutingfile";

/// Writes `scoutingfile<N>` copies to the volume root, one per call.
///
/// The index advances whenever a volume was found, so a failed write never
/// hands its name to a later file. Existing files with the same name are
/// overwritten.
#[derive(Debug)]
pub struct BackupWriter<L> {
    locator: L,
    retry: RetryPolicy,
    next_index: u64,
}

impl<L: VolumeLocator> BackupWriter<L> {
    pub fn new(locator: L, retry: RetryPolicy, start_index: u64) -> Self {
        Self {
            locator,
            retry,
            next_index: start_index,
        }
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Copy `source` byte for byte to the next backup name.
    pub async fn backup(&mut self, source: &Path, cancel: &CancellationToken) -> Result<PathBuf> {
        let volume = locate_with_retry(&self.locator, &self.retry, cancel).await?;
        let target = volume.join(backup_file_name(self.next_index));
        self.next_index += 1;

        let bytes = fs::copy(source, &target).map_err(|e| IngestError::io(&target, e))?;
        tracing::info!(
            source = %source.display(),
            target = %target.display(),
            bytes,
            "Backed up file"
        );
        Ok(target)
    }
}

pub fn backup_file_name(index: u64) -> String {
    format!("{}{}", BACKUP_FILE_PREFIX, index)
}
