//! Per-file ingestion: read, back up, decode, persist.
//!
//! Shared by the directory watcher and USB import so both report to the
//! operator the same way.

use crate::backup::BackupWriter;
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::persist::PersistenceOrchestrator;
use crate::reader::{is_plain_text, read_payload};
use crate::volume::{MountRootLocator, VolumeLocator};
use scoutwatch_db::StoreConnector;
use scoutwatch_logging::OperatorLog;
use scoutwatch_protocol::{decode, Form, HeaderLayout};
use std::path::{Path, PathBuf};

/// What happened to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub forms_decoded: usize,
    pub forms_stored: usize,
    pub forms_failed: usize,
    pub decode_errors: usize,
    pub backup: Option<PathBuf>,
}

/// Decoded forms of one file on their way into the store.
/// `next` indexes the first form still to be attempted.
#[derive(Debug)]
struct PendingFile {
    name: String,
    report: FileReport,
    forms: Vec<Form>,
    next: usize,
}

/// Everything a file needs on its way into the store.
pub struct IngestContext<C, L = MountRootLocator> {
    pub layout: HeaderLayout,
    pub orchestrator: PersistenceOrchestrator<C>,
    pub backup: Option<BackupWriter<L>>,
    pub log: OperatorLog,
    pub cancel: CancellationToken,
    stalled: Option<PendingFile>,
}

impl<C: StoreConnector, L: VolumeLocator> IngestContext<C, L> {
    pub fn new(
        layout: HeaderLayout,
        orchestrator: PersistenceOrchestrator<C>,
        log: OperatorLog,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            layout,
            orchestrator,
            backup: None,
            log,
            cancel,
            stalled: None,
        }
    }

    pub fn with_backup(mut self, backup: BackupWriter<L>) -> Self {
        self.backup = Some(backup);
        self
    }

    /// Ingest one file.
    ///
    /// Returns `Err` only when the file could not be read or the store is
    /// unavailable. Decode errors and failed forms are logged and counted
    /// in the report; the remaining forms still go through. After a store
    /// outage the file's unstored forms are kept for [`Self::resume`].
    pub async fn ingest_file(&mut self, path: &Path, backup: bool) -> Result<FileReport> {
        let mut report = FileReport {
            path: path.to_path_buf(),
            ..FileReport::default()
        };
        let name = display_name(path);

        let payload = match read_payload(path) {
            Ok(payload) => payload,
            Err(e) => {
                self.log.error(format!("Could not read {}: {}", name, e));
                return Err(e);
            }
        };
        if !is_plain_text(&payload) {
            self.log.warn(format!("{} is not a plain-text export", name));
        }

        if backup {
            if let Some(writer) = self.backup.as_mut() {
                match writer.backup(path, &self.cancel).await {
                    Ok(target) => report.backup = Some(target),
                    Err(e) => self.log.warn(format!("Backup of {} skipped: {}", name, e)),
                }
            }
        }

        let outcome = decode(&payload, self.layout);
        report.forms_decoded = outcome.forms.len();
        report.decode_errors = outcome.errors.len();
        for err in &outcome.errors {
            self.log.warn(format!("{}: {}", name, err));
        }

        self.persist(PendingFile {
            name,
            report,
            forms: outcome.forms,
            next: 0,
        })
        .await
    }

    /// Path of the file left unfinished by a store outage.
    pub fn stalled_path(&self) -> Option<&Path> {
        self.stalled.as_ref().map(|file| file.report.path.as_path())
    }

    /// Continue the stalled file from the form that hit the outage. Forms
    /// stored before the outage are not inserted again. `None` when no
    /// file is stalled.
    pub async fn resume(&mut self) -> Option<Result<FileReport>> {
        let stalled = self.stalled.take()?;
        self.log.info(format!(
            "Resuming {} at form {} of {}",
            stalled.name,
            stalled.next + 1,
            stalled.forms.len()
        ));
        Some(self.persist(stalled).await)
    }

    async fn persist(&mut self, mut file: PendingFile) -> Result<FileReport> {
        let results = self
            .orchestrator
            .store_all(&mut file.forms[file.next..], &self.cancel)
            .await;

        for result in results {
            let form = &file.forms[file.next];
            match result {
                Ok(form_id) => {
                    file.report.forms_stored += 1;
                    self.log.info(format!(
                        "Stored {} form {} for team {} ({} records)",
                        form.form_type,
                        form_id,
                        form.team_num,
                        form.records.len()
                    ));
                }
                Err(e) if e.is_fatal() => {
                    self.log.error(format!(
                        "Store unavailable while ingesting {}; ingestion paused: {}",
                        file.name, e
                    ));
                    self.stalled = Some(file);
                    return Err(e);
                }
                Err(e) => {
                    file.report.forms_failed += 1;
                    self.log.error(format!(
                        "{}: team {} form not fully stored: {}",
                        file.name, form.team_num, e
                    ));
                }
            }
            file.next += 1;
        }

        if file.report.forms_decoded == 0 && file.report.decode_errors == 0 {
            self.log.warn(format!("{} held no forms", file.name));
        }
        Ok(file.report)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

