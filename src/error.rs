use std::path::PathBuf;

/// Per-file failures. None of these stop the watcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("MIDI parse error: {0}")]
    Parse(String),

    #[error("MIDI encode error: {0}")]
    Encode(String),

    #[error("SMPTE/timecode division is not supported")]
    UnsupportedTiming,

    #[error("unsupported max note length: {0:?}")]
    UnsupportedNoteLength(String),

    #[error("failed to replace {path} after {attempts} attempts: {source}")]
    CommitFailed {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
