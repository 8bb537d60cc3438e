//! Watch/debounce engine: filesystem notifications in, settled per-path
//! processing out, with the engine's own replacements suppressed.

use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

mod engine;
mod listener;
mod state;

pub use engine::{DebounceEngine, Handled, Processor};
pub use listener::listen;
pub use state::{Verdict, WatchState};

/// Feed notifications into `engine` until `shutdown` resolves or the
/// listener goes away.
pub async fn run(
    engine: &DebounceEngine,
    mut changes: UnboundedReceiver<PathBuf>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Some(path) => engine.notify(path),
                None => {
                    info!("listener closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
    }
}
