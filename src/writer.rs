//! Change-aware, atomic file replacement.
//!
//! A transformed file is only written when its serialized bytes differ from
//! what is on disk. Writes go to a scratch file beside the target which is
//! then renamed over it, so readers see either the old or the new content.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::{NamedTempFile, PersistError};
use tracing::warn;

use crate::codec;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::midi_event::MidiFile;

/// Suffix of scratch files. Never matches the MIDI extension filter.
pub const SCRATCH_SUFFIX: &str = ".midiwatch.tmp";

/// Told about every committed replacement, before `commit` returns.
pub trait CommitObserver: Send + Sync {
    fn mark_self_written(&self, path: &Path, fingerprint: Fingerprint);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Serialized output is byte-identical to the current file.
    Unchanged,
    Written(Fingerprint),
}

#[derive(Debug, Clone)]
pub struct ChangeAwareWriter {
    replace_attempts: u32,
    replace_retry_delay: Duration,
}

impl ChangeAwareWriter {
    pub fn new(replace_attempts: u32, replace_retry_delay: Duration) -> Self {
        Self {
            replace_attempts: replace_attempts.max(1),
            replace_retry_delay,
        }
    }

    /// Replace `path` with `file` unless the result equals `current` (the
    /// bytes `file` was derived from).
    pub fn commit(
        &self,
        path: &Path,
        current: &[u8],
        file: &MidiFile,
        observer: &dyn CommitObserver,
    ) -> Result<CommitOutcome> {
        let before = Fingerprint::from_data(current);
        let bytes = codec::serialize(file)?;
        let after = Fingerprint::from_data(&bytes);
        if before == after {
            return Ok(CommitOutcome::Unchanged);
        }

        let scratch = stage(path, &bytes)?;
        self.replace(scratch, path)?;
        observer.mark_self_written(path, after);
        Ok(CommitOutcome::Written(after))
    }

    fn replace(&self, mut scratch: NamedTempFile, path: &Path) -> Result<()> {
        let mut attempt = 1;
        loop {
            match scratch.persist(path) {
                Ok(_) => return Ok(()),
                Err(PersistError { error, file }) => {
                    if attempt >= self.replace_attempts {
                        // dropping `file` removes the scratch copy
                        drop(file);
                        return Err(Error::CommitFailed {
                            path: path.to_path_buf(),
                            attempts: attempt,
                            source: error,
                        });
                    }
                    warn!(
                        "replace of {} failed (attempt {}/{}): {}",
                        path.display(),
                        attempt,
                        self.replace_attempts,
                        error
                    );
                    scratch = file;
                    attempt += 1;
                    std::thread::sleep(self.replace_retry_delay);
                }
            }
        }
    }
}

/// Write `bytes` to a hidden scratch file in the target's directory, with the
/// target's permissions.
fn stage(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut scratch = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(SCRATCH_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;

    scratch
        .write_all(bytes)
        .and_then(|_| scratch.as_file().sync_all())
        .map_err(|e| Error::io(scratch.path(), e))?;

    if let Ok(metadata) = std::fs::metadata(path) {
        scratch
            .as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| Error::io(scratch.path(), e))?;
    }
    Ok(scratch)
}
