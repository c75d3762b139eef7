//! Logging setup

use crate::coordination::Coordinator;
use std::cell::Cell;
use std::fmt;
use std::fs::File;
use std::time::SystemTime as StdSystemTime;
use tracing::{info, Level, Metadata};
use tracing_subscriber::{
    filter::filter_fn, filter::LevelFilter, fmt::format::Writer, fmt::layer, fmt::time::FormatTime,
    layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

thread_local! {
    static SECONDARY_RANK: Cell<bool> = const { Cell::new(false) };
}

/// Custom time formatter that shows only seconds
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = StdSystemTime::now();
        let duration = now
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        // HH:MM:SS (UTC)
        let total_seconds = duration.as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Marks the calling thread as running `coordinator`'s rank.
///
/// On every rank but the coordinator, `info!` and more severe events from
/// this thread are dropped; `debug!` output stays visible for all ranks.
pub fn log_on_coordinator_only(coordinator: &dyn Coordinator) {
    SECONDARY_RANK.with(|flag| flag.set(!coordinator.is_coordinator()));
}

fn rank_allows(metadata: &Metadata<'_>) -> bool {
    rank_allows_level(metadata.level())
}

fn rank_allows_level(level: &Level) -> bool {
    !(SECONDARY_RANK.with(Cell::get) && *level <= Level::INFO)
}

/// Setup output logging to file or stderr.
///
/// Stdout is left to the manifest printed by the binary. Installing a second
/// global subscriber is a no-op, so repeated calls (tests, several ranks in
/// one process) are harmless.
pub fn setup_output(output_path: Option<&String>, verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    match output_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false)
                    .with_filter(filter_fn(rank_allows));
                if Registry::default()
                    .with(level)
                    .with(file_layer)
                    .try_init()
                    .is_ok()
                {
                    info!("Output will be written to: {}", path);
                }
            }
            Err(e) => eprintln!("Could not create output file {}: {}", path, e),
        },
        None => {
            let stderr_layer = layer()
                .with_writer(std::io::stderr)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true)
                .with_filter(filter_fn(rank_allows));
            let _ = Registry::default().with(level).with(stderr_layer).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{LocalRank, SingleProcess};
    use std::thread;

    #[test]
    fn secondary_ranks_keep_debug_output_only() {
        let group = LocalRank::group(2);
        let verdicts: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = group
                .iter()
                .map(|rank| {
                    scope.spawn(move || {
                        log_on_coordinator_only(rank);
                        [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG]
                            .map(|level| rank_allows_level(&level))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(verdicts[0], [true, true, true, true]);
        assert_eq!(verdicts[1], [false, false, false, true]);
    }

    #[test]
    fn coordinator_thread_logs_everything() {
        log_on_coordinator_only(&SingleProcess);
        assert!(rank_allows_level(&Level::INFO));
        assert!(rank_allows_level(&Level::WARN));
    }
}
