use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::state::{Verdict, WatchState};
use crate::error::Result;
use crate::processor::FileProcessor;
use crate::writer::{CommitObserver, CommitOutcome};

/// What runs once a path has settled.
pub trait Processor: Send + Sync {
    fn process(&self, path: &Path, observer: &dyn CommitObserver) -> Result<CommitOutcome>;
}

impl Processor for FileProcessor {
    fn process(&self, path: &Path, observer: &dyn CommitObserver) -> Result<CommitOutcome> {
        FileProcessor::process(self, path, observer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Last known state matched; the processor was not invoked.
    Suppressed,
    Processed(CommitOutcome),
}

/// Per-path debounce timers in front of a [`Processor`].
///
/// A burst of notifications for one path collapses into a single run once
/// the path has been quiet for `debounce`. Distinct paths run independently.
#[derive(Clone)]
pub struct DebounceEngine {
    state: Arc<WatchState>,
    processor: Arc<dyn Processor>,
    debounce: Duration,
}

impl DebounceEngine {
    pub fn new(
        processor: Arc<dyn Processor>,
        debounce: Duration,
        self_write_window: Duration,
    ) -> Self {
        Self {
            state: Arc::new(WatchState::new(self_write_window)),
            processor,
            debounce,
        }
    }

    /// Record a change notification for `path`. Must be called within a
    /// Tokio runtime.
    pub fn notify(&self, path: PathBuf) {
        self.state.on_change(&path, |generation| {
            let engine = self.clone();
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(engine.debounce).await;
                engine.fire(path, generation).await;
            })
            .abort_handle()
        });
    }

    async fn fire(self, path: PathBuf, generation: u64) {
        if !self.state.begin_processing(&path, generation) {
            return;
        }

        let engine = self.clone();
        let target = path.clone();
        let task = tokio::task::spawn_blocking(move || engine.handle(&target));
        match task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("failed to process {}: {}", path.display(), e),
            Err(e) => error!("processing task for {} failed: {}", path.display(), e),
        }

        if self.state.finish_processing(&path) {
            debug!("{} changed while processing, rescheduling", path.display());
            self.notify(path);
        }
    }

    /// Suppression check plus processing for one settled path. Blocking.
    pub fn handle(&self, path: &Path) -> Result<Handled> {
        match self.state.observe(path)? {
            Verdict::Suppress => {
                debug!("suppressed event for {}", path.display());
                Ok(Handled::Suppressed)
            }
            Verdict::Process => {
                let outcome = self.processor.process(path, self.state.as_ref())?;
                Ok(Handled::Processed(outcome))
            }
        }
    }
}
