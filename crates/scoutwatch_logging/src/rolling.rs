//! Size-capped log file with numbered generations.
//!
//! `<name>.log` is the live file; `<name>.log.1` is the most recent
//! generation and `<name>.log.<keep-1>` the oldest one kept. A file opened
//! with `fresh` set starts a new generation, so each watch session (one
//! event day) reads on its own.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub(crate) struct RollingFile {
    dir: PathBuf,
    stem: String,
    keep: usize,
    max_bytes: u64,
    file: Option<File>,
    written: u64,
}

impl RollingFile {
    pub(crate) fn open(
        dir: &Path,
        app_name: &str,
        keep: usize,
        max_bytes: u64,
        fresh: bool,
    ) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut rolling = Self {
            dir: dir.to_path_buf(),
            stem: file_stem(app_name),
            keep: keep.max(1),
            max_bytes,
            file: None,
            written: 0,
        };
        rolling.reopen()?;
        if rolling.written > rolling.max_bytes || (fresh && rolling.written > 0) {
            rolling.roll()?;
        }
        Ok(rolling)
    }

    fn live_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn generation_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.stem, generation))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.live_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let oldest = self.keep - 1;
        if oldest > 0 {
            let dropped = self.generation_path(oldest);
            if dropped.exists() {
                fs::remove_file(dropped)?;
            }
            for generation in (1..oldest).rev() {
                let from = self.generation_path(generation);
                if from.exists() {
                    fs::rename(from, self.generation_path(generation + 1))?;
                }
            }
            let live = self.live_path();
            if live.exists() {
                fs::rename(live, self.generation_path(1))?;
            }
        } else {
            // Keeping a single file means truncating it in place.
            File::create(self.live_path())?;
        }

        self.reopen()
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.max_bytes {
            self.roll()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `MakeWriter` handle shared by every fmt layer event.
#[derive(Clone)]
pub(crate) struct SharedRollingFile {
    inner: Arc<Mutex<RollingFile>>,
}

impl SharedRollingFile {
    pub(crate) fn new(file: RollingFile) -> Self {
        Self {
            inner: Arc::new(Mutex::new(file)),
        }
    }
}

pub(crate) struct RollingFileGuard {
    inner: Arc<Mutex<RollingFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingFile {
    type Writer = RollingFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        RollingFileGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for RollingFileGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .flush()
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
