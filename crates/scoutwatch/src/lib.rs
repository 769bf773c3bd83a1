//! scoutwatch: tablet scouting file ingestion.
//!
//! Files dropped into a watched directory (or sitting on a USB drive) are
//! decoded with [`scoutwatch_protocol`] and written to the scouting store
//! form by form. The reverse path in [`review`] turns stored rows back into
//! protocol text and per-team summaries.

// Single-threaded runtime; the returned futures need not be Send.
#![allow(async_fn_in_trait)]

pub mod backup;
pub mod cancel;
pub mod config;
pub mod error;
pub mod persist;
pub mod pipeline;
pub mod reader;
pub mod retry;
pub mod review;
pub mod usb;
pub mod volume;
pub mod watcher;

pub use backup::BackupWriter;
pub use cancel::{CancellationToken, ResumeSignal};
pub use config::ScoutwatchConfig;
pub use error::{IngestError, Result};
pub use persist::PersistenceOrchestrator;
pub use pipeline::{FileReport, IngestContext};
pub use retry::RetryPolicy;
pub use review::{render_comments, Reconstructor, TeamAggregates};
pub use usb::{import_from_volume, ImportReport};
pub use volume::{locate_with_retry, MountRootLocator, VolumeLocator};
pub use watcher::{
    DirectoryWatcher, EventSource, PollingEventSource, WatchEvent, WatchEventKind, WatchReport,
    WatchState,
};
