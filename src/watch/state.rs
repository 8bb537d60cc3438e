use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::writer::CommitObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Process,
    /// Content and timestamp match the last known state of the path.
    Suppress,
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    fingerprint: Fingerprint,
    modified: SystemTime,
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    PendingDebounce { generation: u64, timer: AbortHandle },
    /// Notifications that arrive now only set `rearm`.
    Processing { rearm: bool },
}

#[derive(Debug, Default)]
struct PathEntry {
    phase: Phase,
    last_known: Option<Snapshot>,
}

#[derive(Default)]
struct Inner {
    paths: HashMap<PathBuf, PathEntry>,
    next_generation: u64,
}

/// Per-path watch records, behind a single lock.
///
/// Entries are created the first time a path is seen and are never removed.
pub struct WatchState {
    inner: Mutex<Inner>,
    self_write_window: Duration,
}

impl WatchState {
    pub fn new(self_write_window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            self_write_window,
        }
    }

    /// Compare the path's current fingerprint and modification time with the
    /// last known pair. A match within the window is suppressed; anything else
    /// is recorded as the new last known state and should be processed.
    pub fn observe(&self, path: &Path) -> Result<Verdict> {
        let fingerprint = Fingerprint::of_file(path)?;
        let modified = modified_time(path)?;

        let mut inner = self.inner.lock();
        let entry = inner.paths.entry(path.to_path_buf()).or_default();
        if let Some(known) = entry.last_known {
            // a clock that went backwards counts as no elapsed time
            let elapsed = modified
                .duration_since(known.modified)
                .unwrap_or(Duration::ZERO);
            if known.fingerprint == fingerprint && elapsed <= self.self_write_window {
                return Ok(Verdict::Suppress);
            }
        }
        entry.last_known = Some(Snapshot {
            fingerprint,
            modified,
        });
        Ok(Verdict::Process)
    }

    /// Start or restart the debounce timer for `path`.
    ///
    /// `arm` is called with the new timer's generation and must return a
    /// handle that cancels it. While the path is processing no timer starts;
    /// the change is remembered instead.
    pub(crate) fn on_change(&self, path: &Path, arm: impl FnOnce(u64) -> AbortHandle) {
        let mut inner = self.inner.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;

        let entry = inner.paths.entry(path.to_path_buf()).or_default();
        match &mut entry.phase {
            Phase::Processing { rearm } => *rearm = true,
            Phase::PendingDebounce { timer, .. } => {
                timer.abort();
                entry.phase = Phase::PendingDebounce {
                    generation,
                    timer: arm(generation),
                };
            }
            Phase::Idle => {
                entry.phase = Phase::PendingDebounce {
                    generation,
                    timer: arm(generation),
                };
            }
        }
    }

    /// Move from the pending timer `generation` to processing. False when
    /// that timer has been superseded.
    pub(crate) fn begin_processing(&self, path: &Path, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.paths.get_mut(path) {
            Some(entry) => match entry.phase {
                Phase::PendingDebounce { generation: g, .. } if g == generation => {
                    entry.phase = Phase::Processing { rearm: false };
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    /// Return to idle. True when changes arrived during processing and a new
    /// debounce cycle is due.
    pub(crate) fn finish_processing(&self, path: &Path) -> bool {
        let mut inner = self.inner.lock();
        match inner.paths.get_mut(path) {
            Some(entry) => {
                let rearm = matches!(entry.phase, Phase::Processing { rearm: true });
                entry.phase = Phase::Idle;
                rearm
            }
            None => false,
        }
    }
}

impl CommitObserver for WatchState {
    fn mark_self_written(&self, path: &Path, fingerprint: Fingerprint) {
        let modified = modified_time(path).unwrap_or_else(|_| SystemTime::now());
        let mut inner = self.inner.lock();
        let entry = inner.paths.entry(path.to_path_buf()).or_default();
        entry.last_known = Some(Snapshot {
            fingerprint,
            modified,
        });
    }
}

fn modified_time(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, data: &[u8]) -> Fingerprint {
        std::fs::write(path, data).unwrap();
        Fingerprint::from_data(data)
    }

    #[test]
    fn test_first_observation_processes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mid");
        write(&path, b"one");

        let state = WatchState::new(Duration::from_secs(2));
        assert_eq!(state.observe(&path).unwrap(), Verdict::Process);
    }

    #[test]
    fn test_self_write_is_suppressed_then_external_edit_processed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mid");
        let state = WatchState::new(Duration::from_secs(2));

        let ours = write(&path, b"written by us");
        state.mark_self_written(&path, ours);
        assert_eq!(state.observe(&path).unwrap(), Verdict::Suppress);

        write(&path, b"edited elsewhere");
        assert_eq!(state.observe(&path).unwrap(), Verdict::Process);
    }

    #[test]
    fn test_same_content_outside_window_is_processed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mid");
        let state = WatchState::new(Duration::ZERO);

        let ours = write(&path, b"same");
        state.mark_self_written(&path, ours);

        let later = SystemTime::now() + Duration::from_secs(10);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert_eq!(state.observe(&path).unwrap(), Verdict::Process);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = WatchState::new(Duration::from_secs(2));
        assert!(state.observe(&dir.path().join("gone.mid")).is_err());
    }

    #[tokio::test]
    async fn test_phases() {
        let path = Path::new("/music/bass.mid");
        let state = WatchState::new(Duration::from_secs(2));
        let idle = || tokio::spawn(std::future::pending::<()>()).abort_handle();

        let mut first = None;
        state.on_change(path, |g| {
            first = Some(g);
            idle()
        });
        let mut second = None;
        state.on_change(path, |g| {
            second = Some(g);
            idle()
        });
        let (first, second) = (first.unwrap(), second.unwrap());

        assert!(!state.begin_processing(path, first));
        assert!(state.begin_processing(path, second));

        state.on_change(path, |_| panic!("no timer while processing"));
        assert!(state.finish_processing(path));
        assert!(!state.finish_processing(path));
    }
}
