use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use midiwatch::config::{Config, DEFAULT_CONFIG_FILE};
use midiwatch::processor::FileProcessor;
use midiwatch::scanner::{self, MidiFilter};
use midiwatch::watch::{self, DebounceEngine, Handled};
use midiwatch::writer::CommitOutcome;

#[derive(Parser, Debug)]
#[command(version, about = "Watch a folder of MIDI files and rewrite them by filename rules")]
struct Args {
    #[arg(short, long, default_value = ".", help = "Directory to watch recursively")]
    root: PathBuf,

    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, help = "Rule configuration (TOML)")]
    config: PathBuf,

    #[arg(long, help = "Process every file once and exit without watching")]
    once: bool,

    #[arg(long, default_value = "info", help = "Log filter when RUST_LOG is unset")]
    log_level: String,
}

#[derive(Debug, Default)]
struct ScanSummary {
    processed: usize,
    unchanged: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Config::load(&args.config)?;
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("watch root {}", args.root.display()))?;
    anyhow::ensure!(
        root.is_dir(),
        "watch root {} is not a directory",
        root.display()
    );

    let filter = MidiFilter::from_config(&config.global);
    let engine = DebounceEngine::new(
        Arc::new(FileProcessor::from_config(&config)),
        config.watch.debounce(),
        config.watch.self_write_window(),
    );

    // listen before scanning so nothing written meanwhile is missed
    let listening = if args.once {
        None
    } else {
        let listener = watch::listen(&root, filter.clone());
        Some(listener.context("start filesystem watcher")?)
    };

    let summary = {
        let engine = engine.clone();
        let root = root.clone();
        tokio::task::spawn_blocking(move || initial_scan(&engine, &root, &filter))
            .await
            .context("initial scan")?
    };
    info!(
        "initial scan of {}: {} processed, {} unchanged, {} failed",
        root.display(),
        summary.processed,
        summary.unchanged,
        summary.failed
    );

    if let Some((_watcher, changes)) = listening {
        info!("watching {}", root.display());
        watch::run(&engine, changes, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    Ok(())
}

fn initial_scan(engine: &DebounceEngine, root: &Path, filter: &MidiFilter) -> ScanSummary {
    let mut summary = ScanSummary::default();
    for path in scanner::scan(root, filter) {
        match engine.handle(&path) {
            Ok(Handled::Processed(CommitOutcome::Written(_))) => summary.processed += 1,
            Ok(Handled::Processed(CommitOutcome::Unchanged) | Handled::Suppressed) => {
                summary.unchanged += 1
            }
            Err(e) => {
                warn!("failed to process {}: {}", path.display(), e);
                summary.failed += 1;
            }
        }
    }
    summary
}
