use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::warn;

use crate::scanner::MidiFilter;

/// Start a recursive watch on `root`. Accepted MIDI paths that were created
/// or modified come out of the receiver. Dropping the watcher stops it.
pub fn listen(
    root: &Path,
    filter: MidiFilter,
) -> notify::Result<(RecommendedWatcher, UnboundedReceiver<PathBuf>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let base = root.to_path_buf();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for path in changed_paths(&event) {
                let relative = path.strip_prefix(&base).unwrap_or(path);
                if filter.accepts(relative) && tx.send(path.clone()).is_err() {
                    return;
                }
            }
        }
        Err(e) => warn!("watch error: {}", e),
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

/// Paths whose content may now differ. Removals and the source side of a
/// rename carry nothing to process.
fn changed_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..).unwrap_or_default()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
        EventKind::Modify(ModifyKind::Metadata(_)) => &[],
        EventKind::Modify(_) => &event.paths,
        _ => &[],
    }
}
