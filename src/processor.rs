use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::codec;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::midi_event::MidiFile;
use crate::rules::Pipeline;
use crate::writer::{ChangeAwareWriter, CommitObserver, CommitOutcome};

/// Read and parse `path`, retrying both I/O and parse failures.
///
/// A file still being written by another program usually fails to parse, so
/// parse errors get the same bounded retry as I/O errors. The last error is
/// returned once `attempts` are used up.
pub fn read_with_retry(
    path: &Path,
    attempts: u32,
    delay: Duration,
) -> Result<(Vec<u8>, MidiFile)> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = std::fs::read(path)
            .map_err(|e| Error::io(path, e))
            .and_then(|bytes| codec::parse(&bytes).map(|file| (bytes, file)));
        match result {
            Ok(read) => return Ok(read),
            Err(e) if attempt < attempts => {
                debug!(
                    "read of {} failed (attempt {}/{}): {}",
                    path.display(),
                    attempt,
                    attempts,
                    e
                );
                attempt += 1;
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read, transform, and conditionally rewrite a single file. Blocking.
pub struct FileProcessor {
    pipeline: Pipeline,
    writer: ChangeAwareWriter,
    read_attempts: u32,
    read_retry_delay: Duration,
}

impl FileProcessor {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pipeline: Pipeline::from_config(config),
            writer: ChangeAwareWriter::new(
                config.watch.replace_attempts,
                config.watch.replace_retry_delay(),
            ),
            read_attempts: config.watch.read_attempts,
            read_retry_delay: config.watch.read_retry_delay(),
        }
    }

    pub fn process(&self, path: &Path, observer: &dyn CommitObserver) -> Result<CommitOutcome> {
        let (bytes, file) = read_with_retry(path, self.read_attempts, self.read_retry_delay)?;
        let transformed = self.pipeline.run(&file, path)?;
        let outcome = self.writer.commit(path, &bytes, &transformed, observer)?;

        match outcome {
            CommitOutcome::Written(fingerprint) => {
                info!("updated {} ({})", path.display(), fingerprint)
            }
            CommitOutcome::Unchanged => debug!("{} unchanged", path.display()),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::midi_event::{Event, MetaEvent, TrackEvent};

    struct Ignore;

    impl CommitObserver for Ignore {
        fn mark_self_written(&self, _path: &Path, _fingerprint: Fingerprint) {}
    }

    fn config() -> Config {
        Config::parse(
            r#"
            [global]
            mark_processed = true

            [rules.bass]
            filename_contains = ["bass"]
            transpose_semitones = -12

            [rules.drums]
            filename_contains = ["drum"]
            max_note_length = "1/8"
            "#,
            Path::new("test.toml"),
        )
        .unwrap()
    }

    fn bass_bytes() -> Vec<u8> {
        let on = Event::NoteOn {
            channel: 3,
            note: 45,
            velocity: 100,
        };
        let off = Event::NoteOff {
            channel: 3,
            note: 45,
            velocity: 0,
        };
        codec::serialize(&MidiFile {
            format: midly::Format::SingleTrack,
            ticks_per_beat: 96,
            tracks: vec![vec![
                TrackEvent::new(0, on),
                TrackEvent::new(96, off),
                TrackEvent::new(0, Event::Meta(MetaEvent::EndOfTrack)),
            ]],
        })
        .unwrap()
    }

    #[test]
    fn test_read_with_retry_gives_up_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mid");
        std::fs::write(&path, b"not a midi file").unwrap();

        let delay = Duration::from_millis(1);
        let err = read_with_retry(&path, 3, delay).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_read_with_retry_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.mid");
        let delay = Duration::from_millis(1);
        let err = read_with_retry(&path, 2, delay).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_read_with_retry_sees_late_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.mid");
        std::fs::write(&path, b"MThd").unwrap();

        let writer_path = path.clone();
        let bytes = bass_bytes();
        let late = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            std::fs::write(writer_path, bytes).unwrap();
        });

        let delay = Duration::from_millis(10);
        let (_, file) = read_with_retry(&path, 50, delay).unwrap();
        late.join().unwrap();
        assert_eq!(file.ticks_per_beat, 96);
    }

    #[test]
    fn test_process_then_reprocess_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_bass.mid");
        std::fs::write(&path, bass_bytes()).unwrap();

        let processor = FileProcessor::from_config(&config());
        let first = processor.process(&path, &Ignore).unwrap();
        assert!(matches!(first, CommitOutcome::Written(_)));

        let (_, file) = read_with_retry(&path, 1, Duration::ZERO).unwrap();
        let keys: Vec<_> = file.tracks[0]
            .iter()
            .filter_map(|e| e.event.note_key())
            .collect();
        assert_eq!(keys, vec![(33, 0), (33, 0)]);

        let second = processor.process(&path, &Ignore).unwrap();
        assert_eq!(second, CommitOutcome::Unchanged);
    }
}
