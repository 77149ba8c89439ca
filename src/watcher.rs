//! Watching the dump directory and driving debounced organize passes.

use crate::config::Config;
use crate::debounce::Debouncer;
use crate::organizer::{self, FileOutcome, SkipReason};
use crate::rules::DestinationRule;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, trace, warn};

/// Stream of raw notifications for the dump directory.
pub type EventReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Errors that prevent watching from starting. Both are fatal.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("dump directory does not exist: {}", .0.display())]
    DumpDirMissing(PathBuf),

    #[error("failed to watch {}: {source}", .path.display())]
    Subscribe {
        path: PathBuf,
        source: notify::Error,
    },
}

/// Why [`WatchLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown future completed.
    Shutdown,
    /// The notification channel was closed by the watcher.
    ChannelClosed,
}

/// Subscribes to change notifications for `dump_dir` (non-recursive).
///
/// The returned watcher must be kept alive for as long as events are wanted;
/// dropping it closes the channel.
pub fn subscribe(dump_dir: &Path) -> Result<(RecommendedWatcher, EventReceiver), WatchError> {
    if !dump_dir.is_dir() {
        return Err(WatchError::DumpDirMissing(dump_dir.to_path_buf()));
    }

    let subscribe_error = |e: notify::Error| WatchError::Subscribe {
        path: dump_dir.to_path_buf(),
        source: e,
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| {
            if events_tx.send(result).is_err() {
                trace!("dropping filesystem event, watch loop has exited");
            }
        },
        notify::Config::default(),
    )
    .map_err(subscribe_error)?;

    watcher
        .watch(dump_dir, RecursiveMode::NonRecursive)
        .map_err(subscribe_error)?;

    info!(dump_dir = %dump_dir.display(), "watching dump directory");
    Ok((watcher, events_rx))
}

/// Consumes change notifications and runs one organize pass per quiet period.
pub struct WatchLoop {
    dump_dir: PathBuf,
    rules: Arc<[DestinationRule]>,
    delay: Duration,
}

impl WatchLoop {
    pub fn new(dump_dir: impl Into<PathBuf>, rules: Vec<DestinationRule>, delay: Duration) -> Self {
        Self {
            dump_dir: dump_dir.into(),
            rules: rules.into(),
            delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.dump_directory.clone(),
            config.destinations.clone(),
            config.debounce_delay(),
        )
    }

    /// Processes `events` until the channel closes or `shutdown` completes.
    ///
    /// Every successful notification, whatever its kind, re-arms the debounce
    /// timer. Notification errors are logged and leave the timer alone. On
    /// exit the pending timer is cancelled and any pass already running is
    /// awaited.
    #[instrument(skip_all, fields(dump_dir = %self.dump_dir.display()))]
    pub async fn run<S>(self, mut events: EventReceiver, shutdown: S) -> LoopExit
    where
        S: Future<Output = ()>,
    {
        let dump_dir = self.dump_dir.clone();
        let rules = Arc::clone(&self.rules);
        let mut debouncer = Debouncer::new(self.delay, move || run_pass(&dump_dir, &rules));
        tokio::pin!(shutdown);

        let exit = loop {
            tokio::select! {
                _ = &mut shutdown => break LoopExit::Shutdown,
                event = events.recv() => match event {
                    Some(Ok(event)) => {
                        debug!(kind = ?event.kind, paths = ?event.paths, "filesystem event");
                        debouncer.on_event();
                    }
                    Some(Err(e)) => warn!(error = %e, "filesystem notification error"),
                    None => break LoopExit::ChannelClosed,
                },
            }
        };

        debouncer.stop();
        debouncer.drain().await;
        info!(?exit, "watch loop stopped");
        exit
    }
}

/// Runs a single organize pass and logs each file and the totals.
pub fn run_pass(dump_dir: &Path, rules: &[DestinationRule]) {
    info!(dump_dir = %dump_dir.display(), "organizing files");
    match organizer::organize_with(dump_dir, rules, log_file_outcome) {
        Ok(outcome) => info!(
            moved = outcome.moved_count(),
            skipped = outcome.skipped_count(),
            "organize pass complete"
        ),
        Err(e) => error!(error = %e, "organize pass failed"),
    }
}

fn log_file_outcome(file: FileOutcome<'_>) {
    match file {
        FileOutcome::Moved(relocation) => info!(
            source = %relocation.source.display(),
            destination = %relocation.destination.display(),
            method = ?relocation.method,
            "moved"
        ),
        FileOutcome::Skipped(path, SkipReason::NoRuleMatched) => {
            info!(file = %path.display(), "no rule matched")
        }
        FileOutcome::Skipped(path, reason) => {
            warn!(file = %path.display(), error = %reason, "could not move")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::EventKind;
    use notify::event::CreateKind;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::oneshot;
    use tokio::time::sleep;

    const DELAY: Duration = Duration::from_secs(5);

    fn create_event(path: &Path) -> notify::Result<Event> {
        Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(path.to_path_buf()))
    }

    struct Layout {
        _temp_dir: TempDir,
        dump: PathBuf,
        out: PathBuf,
    }

    fn layout() -> Layout {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dump = temp_dir.path().join("dump");
        let out = temp_dir.path().join("out");
        fs::create_dir_all(&dump).unwrap();
        Layout {
            _temp_dir: temp_dir,
            dump,
            out,
        }
    }

    #[test]
    fn test_subscribe_missing_dump_dir() {
        let result = subscribe(Path::new("/non/existent/dump"));
        assert!(matches!(result, Err(WatchError::DumpDirMissing(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_triggers_pass_after_delay() {
        let layout = layout();
        fs::write(layout.dump.join("note.txt"), "hello").unwrap();
        let rules = vec![DestinationRule::new(&layout.out, None, Some(".txt"))];

        let (tx, rx) = mpsc::unbounded_channel();
        let watch = tokio::spawn(
            WatchLoop::new(&layout.dump, rules, DELAY).run(rx, std::future::pending()),
        );

        tx.send(create_event(&layout.dump.join("note.txt"))).unwrap();
        sleep(Duration::from_secs(1)).await;
        assert!(layout.dump.join("note.txt").exists(), "pass ran too early");

        sleep(DELAY).await;
        drop(tx);
        let exit = watch.await.unwrap();

        assert_eq!(exit, LoopExit::ChannelClosed);
        assert!(!layout.dump.join("note.txt").exists());
        assert_eq!(fs::read_to_string(layout.out.join("note.txt")).unwrap(), "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_errors_do_not_arm_timer() {
        let layout = layout();
        fs::write(layout.dump.join("note.txt"), "").unwrap();
        let rules = vec![DestinationRule::new(&layout.out, None, Some(".txt"))];

        let (tx, rx) = mpsc::unbounded_channel();
        let watch = tokio::spawn(
            WatchLoop::new(&layout.dump, rules, DELAY).run(rx, std::future::pending()),
        );

        tx.send(Err(notify::Error::generic("queue overflow"))).unwrap();
        sleep(DELAY * 3).await;
        drop(tx);
        watch.await.unwrap();

        assert!(layout.dump.join("note.txt").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_pass() {
        let layout = layout();
        fs::write(layout.dump.join("note.txt"), "").unwrap();
        let rules = vec![DestinationRule::new(&layout.out, None, Some(".txt"))];

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let watch = tokio::spawn(WatchLoop::new(&layout.dump, rules, DELAY).run(rx, async {
            let _ = stop_rx.await;
        }));

        tx.send(create_event(&layout.dump.join("note.txt"))).unwrap();
        sleep(Duration::from_secs(1)).await;
        stop_tx.send(()).unwrap();
        let exit = watch.await.unwrap();

        sleep(DELAY * 2).await;
        assert_eq!(exit, LoopExit::Shutdown);
        assert!(layout.dump.join("note.txt").exists());
        assert!(!layout.out.exists());
    }
}
