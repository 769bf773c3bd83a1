//! Directory watching.
//!
//! A [`DirectoryWatcher`] pulls batches of file events from an
//! [`EventSource`] and feeds each file through the ingestion pipeline, in
//! batch order, before asking for the next batch.
//!
//! ```text
//! Watching -> EventReceived -> Processing -> Watching
//!     |                           ^    |
//!     +-> Inaccessible            |    v
//!     +-> Stopped (cancelled)     +- Halted (store unavailable)
//! ```
//!
//! `Halted` is a pause. The file that hit the outage and the rest of its
//! batch stay queued; the store is retried every resume interval, if one
//! is set, or at once when the operator raises the [`ResumeSignal`].

use crate::cancel::{CancellationToken, ResumeSignal};
use crate::pipeline::{FileReport, IngestContext};
use crate::volume::{is_hidden, VolumeLocator};
use scoutwatch_db::StoreConnector;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

/// Source of file events for one directory.
pub trait EventSource {
    fn directory(&self) -> &Path;

    /// Wait for the next non-empty batch, oldest event first. An empty
    /// batch means the wait was cancelled.
    async fn next_batch(&mut self, cancel: &CancellationToken) -> io::Result<Vec<WatchEvent>>;

    /// Re-arm after a batch was drained. `false` once the directory can no
    /// longer be watched.
    fn renew(&mut self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Snapshot-diffing event source.
///
/// Files present when the source is created are the baseline and never
/// reported. A new file is reported once its size and mtime hold still
/// across two polls, so a tablet still copying is not read half-written.
/// Hidden files are ignored.
#[derive(Debug)]
pub struct PollingEventSource {
    dir: PathBuf,
    interval: Duration,
    include_modified: bool,
    seen: HashMap<PathBuf, FileStamp>,
    pending: HashMap<PathBuf, (WatchEventKind, FileStamp)>,
}

impl PollingEventSource {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration, include_modified: bool) -> io::Result<Self> {
        let dir = dir.into();
        let seen = snapshot(&dir)?;
        debug!(dir = %dir.display(), baseline = seen.len(), "Polling source ready");
        Ok(Self {
            dir,
            interval,
            include_modified,
            seen,
            pending: HashMap::new(),
        })
    }

    /// One snapshot diff. Returns settled events, oldest first.
    pub fn poll(&mut self) -> io::Result<Vec<WatchEvent>> {
        let current = snapshot(&self.dir)?;
        let mut settled: Vec<(FileStamp, WatchEvent)> = Vec::new();
        let mut seen = HashMap::with_capacity(current.len());
        let mut pending = HashMap::new();

        for (path, stamp) in current {
            if let Some((kind, previous)) = self.pending.get(&path) {
                if *previous == stamp {
                    settled.push((
                        stamp.clone(),
                        WatchEvent {
                            kind: *kind,
                            path: path.clone(),
                        },
                    ));
                    seen.insert(path, stamp);
                } else {
                    pending.insert(path, (*kind, stamp));
                }
            } else if let Some(previous) = self.seen.get(&path) {
                if *previous != stamp && self.include_modified {
                    pending.insert(path, (WatchEventKind::Modified, stamp));
                } else {
                    seen.insert(path, stamp);
                }
            } else {
                pending.insert(path, (WatchEventKind::Created, stamp));
            }
        }

        self.seen = seen;
        self.pending = pending;

        settled.sort_by(|(a, ea), (b, eb)| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| ea.path.file_name().cmp(&eb.path.file_name()))
        });
        Ok(settled.into_iter().map(|(_, event)| event).collect())
    }
}

impl EventSource for PollingEventSource {
    fn directory(&self) -> &Path {
        &self.dir
    }

    async fn next_batch(&mut self, cancel: &CancellationToken) -> io::Result<Vec<WatchEvent>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            let events = self.poll()?;
            if !events.is_empty() {
                return Ok(events);
            }
            if !cancel.sleep(self.interval).await {
                return Ok(Vec::new());
            }
        }
    }

    fn renew(&mut self) -> bool {
        fs::read_dir(&self.dir).is_ok()
    }
}

fn snapshot(dir: &Path) -> io::Result<HashMap<PathBuf, FileStamp>> {
    let mut files = HashMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        // Entries can vanish between listing and stat.
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        if !metadata.is_file() {
            continue;
        }
        files.insert(
            path,
            FileStamp {
                len: metadata.len(),
                modified: metadata.modified().ok(),
            },
        );
    }
    Ok(files)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Watching,
    EventReceived,
    Processing,
    /// The directory disappeared or stopped being readable.
    Inaccessible,
    /// The store could not be reached; paused until it answers again.
    Halted,
    Stopped,
}

impl WatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WatchState::Inaccessible | WatchState::Stopped)
    }
}

/// Counters for one watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchReport {
    pub exit: WatchState,
    pub batches: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub forms_stored: usize,
    pub forms_failed: usize,
    pub decode_errors: usize,
    /// Times the loop paused on a store outage
    pub halts: usize,
}

impl WatchReport {
    fn new() -> Self {
        Self {
            exit: WatchState::Watching,
            batches: 0,
            files_processed: 0,
            files_failed: 0,
            forms_stored: 0,
            forms_failed: 0,
            decode_errors: 0,
            halts: 0,
        }
    }

    fn add_file(&mut self, file: &FileReport) {
        self.files_processed += 1;
        self.forms_stored += file.forms_stored;
        self.forms_failed += file.forms_failed;
        self.decode_errors += file.decode_errors;
    }
}

const DEFAULT_RESUME_INTERVAL: Duration = Duration::from_secs(30);
const RESUME_POLL: Duration = Duration::from_millis(50);

pub struct DirectoryWatcher<S> {
    source: S,
    state: WatchState,
    resume: ResumeSignal,
    resume_interval: Option<Duration>,
}

impl<S: EventSource> DirectoryWatcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: WatchState::Watching,
            resume: ResumeSignal::new(),
            resume_interval: Some(DEFAULT_RESUME_INTERVAL),
        }
    }

    /// `interval` of `None` leaves retries to the operator alone.
    pub fn with_resume(mut self, resume: ResumeSignal, interval: Option<Duration>) -> Self {
        self.resume = resume;
        self.resume_interval = interval;
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run until cancelled or the directory becomes inaccessible. A store
    /// outage pauses the loop in `Halted` rather than ending it.
    pub async fn run<C, L>(&mut self, ctx: &mut IngestContext<C, L>) -> WatchReport
    where
        C: StoreConnector,
        L: VolumeLocator,
    {
        let mut report = WatchReport::new();
        let mut queue: VecDeque<WatchEvent> = VecDeque::new();
        let dir = self.source.directory().display().to_string();
        ctx.log.info(format!("Watching {}", dir));

        'watch: loop {
            if ctx.cancel.is_cancelled() {
                self.transition(WatchState::Stopped);
                break;
            }

            if queue.is_empty() {
                self.transition(WatchState::Watching);
                let batch = match self.source.next_batch(&ctx.cancel).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        ctx.log.error(format!("Watch directory {} is inaccessible: {}", dir, e));
                        self.transition(WatchState::Inaccessible);
                        break;
                    }
                };
                if batch.is_empty() {
                    continue;
                }

                self.transition(WatchState::EventReceived);
                report.batches += 1;
                ctx.log.info(format!("Reading {} new file(s)", batch.len()));
                queue.extend(batch);
            }

            self.transition(WatchState::Processing);
            while let Some(event) = queue.pop_front() {
                if ctx.cancel.is_cancelled() {
                    queue.push_front(event);
                    break;
                }
                debug!(kind = ?event.kind, path = %event.path.display(), "Processing file event");
                match ctx.ingest_file(&event.path, true).await {
                    Ok(file) => report.add_file(&file),
                    Err(e) if e.is_fatal() => {
                        if ctx.cancel.is_cancelled() {
                            self.transition(WatchState::Stopped);
                            break 'watch;
                        }
                        report.halts += 1;
                        if !self.wait_for_store(ctx, &mut report).await {
                            self.transition(WatchState::Stopped);
                            break 'watch;
                        }
                        self.transition(WatchState::Processing);
                    }
                    Err(_) => report.files_failed += 1,
                }
            }
            if !queue.is_empty() {
                continue;
            }

            if !self.source.renew() {
                ctx.log.error(format!("Watch directory {} is no longer accessible", dir));
                self.transition(WatchState::Inaccessible);
                break;
            }
        }

        if let Some(path) = ctx.stalled_path() {
            queue.push_front(WatchEvent {
                kind: WatchEventKind::Created,
                path: path.to_path_buf(),
            });
        }
        for event in &queue {
            ctx.log.warn(format!(
                "Not ingested: {} (use `scoutwatch ingest` to load it)",
                event.path.display()
            ));
        }

        report.exit = self.state;
        info!(?report, "Watch loop finished");
        report
    }

    /// Stay in `Halted` until the stalled file goes through. Returns
    /// `false` if cancelled while paused.
    async fn wait_for_store<C, L>(
        &mut self,
        ctx: &mut IngestContext<C, L>,
        report: &mut WatchReport,
    ) -> bool
    where
        C: StoreConnector,
        L: VolumeLocator,
    {
        self.transition(WatchState::Halted);
        ctx.log.error(match self.resume_interval {
            Some(interval) => format!(
                "Ingestion paused: store unavailable. Retrying every {:?}; send SIGUSR1 to retry now",
                interval
            ),
            None => "Ingestion paused: store unavailable. Send SIGUSR1 to retry".to_string(),
        });

        loop {
            if !self.pause(&ctx.cancel).await {
                return false;
            }
            ctx.log.info("Retrying store");
            match ctx.resume().await {
                None => return true,
                Some(Ok(file)) => {
                    report.add_file(&file);
                    ctx.log.info("Store reachable again; ingestion resumed");
                    return true;
                }
                Some(Err(e)) if e.is_fatal() => {
                    warn!(error = %e, "Store still unavailable");
                }
                Some(Err(_)) => {
                    report.files_failed += 1;
                    return true;
                }
            }
        }
    }

    /// Sleep out the resume interval, cut short by an operator request.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        let deadline = self
            .resume_interval
            .map(|interval| tokio::time::Instant::now() + interval);
        while !self.resume.take() {
            let step = match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        break;
                    }
                    (deadline - now).min(RESUME_POLL)
                }
                None => RESUME_POLL,
            };
            if !cancel.sleep(step).await {
                return false;
            }
        }
        !cancel.is_cancelled()
    }

    fn transition(&mut self, next: WatchState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Watch state");
            self.state = next;
        }
    }
}
