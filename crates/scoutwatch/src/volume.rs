//! Removable volume discovery.

use crate::cancel::CancellationToken;
use crate::error::{IngestError, Result};
use crate::retry::{retry, RetryPolicy};
use std::fs;
use std::path::{Path, PathBuf};

/// Finds the root of a currently mounted removable volume.
pub trait VolumeLocator {
    /// One lookup; `None` when nothing is mounted right now.
    fn locate(&self) -> Option<PathBuf>;
}

impl<L: VolumeLocator + ?Sized> VolumeLocator for &L {
    fn locate(&self) -> Option<PathBuf> {
        (**self).locate()
    }
}

/// Treats each directory under the configured mount roots as a volume.
///
/// When several are mounted the last one by name wins, so the choice is
/// stable across lookups.
#[derive(Debug, Clone)]
pub struct MountRootLocator {
    roots: Vec<PathBuf>,
}

impl MountRootLocator {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Every mounted volume, sorted by name.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = Vec::new();
        for root in &self.roots {
            let entries = match fs::read_dir(root) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                if is_hidden(&entry.path()) {
                    continue;
                }
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    found.push(entry.path());
                }
            }
        }
        found.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
        found
    }
}

impl VolumeLocator for MountRootLocator {
    fn locate(&self) -> Option<PathBuf> {
        self.candidates().pop()
    }
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Poll `locator` under `policy` until a volume shows up.
///
/// Returns [`IngestError::VolumeNotFound`] once the attempts or the timeout
/// run out, or when cancelled.
pub async fn locate_with_retry<L: VolumeLocator + ?Sized>(
    locator: &L,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let found = retry(policy, cancel, |attempt| {
        let found = locator.locate();
        if found.is_none() {
            tracing::debug!(attempt, "No removable volume mounted");
        }
        std::future::ready(found.ok_or(()))
    })
    .await;

    match found {
        Ok(volume) => {
            tracing::debug!(volume = %volume.display(), "Located removable volume");
            Ok(volume)
        }
        Err(exhausted) => Err(IngestError::VolumeNotFound {
            attempts: exhausted.attempts,
            elapsed_ms: exhausted.elapsed.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[test]
    fn test_last_volume_by_name_wins() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("media");
        fs::create_dir_all(root.join("KINGSTON")).unwrap();
        fs::create_dir_all(root.join("SCOUT_B")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("zz_not_a_volume"), b"").unwrap();

        let locator = MountRootLocator::new(vec![root.clone(), temp.path().join("absent")]);
        assert_eq!(locator.candidates().len(), 2);
        assert_eq!(locator.locate(), Some(root.join("SCOUT_B")));
    }

    #[test]
    fn test_nothing_mounted() {
        let temp = TempDir::new().unwrap();
        let locator = MountRootLocator::new(vec![temp.path().to_path_buf()]);
        assert_eq!(locator.locate(), None);
    }

    #[tokio::test]
    async fn test_not_found_within_timeout() {
        let temp = TempDir::new().unwrap();
        let locator = MountRootLocator::new(vec![temp.path().to_path_buf()]);
        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff_ms: 20,
            max_backoff_ms: 80,
            multiplier: 2,
            timeout_ms: 250,
        };

        let start = Instant::now();
        let err = locate_with_retry(&locator, &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(250 + 150));
        assert!(matches!(err, IngestError::VolumeNotFound { attempts, .. } if attempts > 1));
    }
}
