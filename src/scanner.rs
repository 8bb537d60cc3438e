//! Recursive discovery of MIDI files under the watched root.

use std::path::{Component, Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::config::GlobalConfig;

const MIDI_EXTENSIONS: [&str; 2] = ["mid", "midi"];

/// Which paths count as MIDI files worth processing. All matching is
/// case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct MidiFilter {
    ignore_filename_contains: Vec<String>,
    ignore_folders: Vec<String>,
}

impl MidiFilter {
    pub fn new(ignore_filename_contains: &[String], ignore_folders: &[String]) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_lowercase())
                .collect()
        };
        Self {
            ignore_filename_contains: lower(ignore_filename_contains),
            ignore_folders: lower(ignore_folders),
        }
    }

    pub fn from_config(global: &GlobalConfig) -> Self {
        Self::new(&global.ignore_filename_contains, &global.ignore_folders)
    }

    /// `path` is relative to the watched root, so folders above the root
    /// never count as ignored.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        if !self.accepts_file_name(&name.to_string_lossy()) {
            return false;
        }
        let mut dirs = path.parent().into_iter().flat_map(Path::components);
        !dirs.any(|c| match c {
            Component::Normal(dir) => self.ignores_folder(&dir.to_string_lossy()),
            _ => false,
        })
    }

    fn accepts_file_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        let is_midi = Path::new(&lower)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MIDI_EXTENSIONS.contains(&ext));
        let ignored = self
            .ignore_filename_contains
            .iter()
            .any(|s| lower.contains(s.as_str()));
        is_midi && !ignored
    }

    fn ignores_folder(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.ignore_folders.iter().any(|f| *f == lower)
    }
}

/// Every accepted MIDI file under `root`, sorted. Ignored folders are not
/// descended into; unreadable entries are logged and skipped.
pub fn scan(root: &Path, filter: &MidiFilter) -> Vec<PathBuf> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !filter.ignores_folder(&entry.file_name().to_string_lossy())
    });

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file()
            && filter.accepts_file_name(&entry.file_name().to_string_lossy())
        {
            found.push(entry.into_path());
        }
    }
    found.sort();
    found
}
