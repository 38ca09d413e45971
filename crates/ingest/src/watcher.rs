//! Debounced, non-recursive directory watching.
//!
//! Raw change events come from `notify::RecommendedWatcher` and are bridged
//! into a tokio channel. [`run_debounce_loop`] drives an explicit
//! [`DebounceState`] machine over that channel and invokes the registered
//! [`NotificationHandler`] once per quiet period. The loop never touches
//! `notify` itself, so it can be fed directly.
//!
//! Watching is not persistent: nothing survives a restart, and missed
//! events are never replayed. Callers recover by running a full cycle on
//! startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Capacity of the channel bridging `notify` callbacks to the debounce loop.
///
/// When full, further raw events are dropped: one queued event is enough to
/// schedule a cycle, and every cycle rescans the whole directory.
const CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to resolve watch directory {}: {source}", dir.display())]
    Directory {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("Filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Receives one call per debounce quiet period.
///
/// Calls are never concurrent for a given watcher: the loop awaits each call
/// before looking at further events.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn notify(&self);
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// `Idle -> Pending(deadline) -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: Instant },
}

impl DebounceState {
    /// A matching event arrived: start the quiet period, or restart it.
    pub fn on_event(&mut self, now: Instant, delay: Duration) {
        *self = Self::Pending {
            deadline: now + delay,
        };
    }

    /// Returns `true` exactly once per quiet period, when the deadline has
    /// passed, and moves back to `Idle`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match *self {
            Self::Pending { deadline } if now >= deadline => {
                *self = Self::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending deadline without firing.
    pub fn cancel(&mut self) {
        *self = Self::Idle;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Idle => None,
            Self::Pending { deadline } => Some(*deadline),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Decides which raw event paths count toward a debounce cycle.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    dir: PathBuf,
    pattern: Regex,
}

impl WatchFilter {
    pub fn new(dir: impl Into<PathBuf>, pattern: Regex) -> Self {
        Self {
            dir: dir.into(),
            pattern,
        }
    }

    /// Direct children of the watched directory whose file name matches.
    pub fn matches(&self, path: &Path) -> bool {
        if path.parent() != Some(self.dir.as_path()) {
            return false;
        }
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.pattern.is_match(name))
    }
}

// ---------------------------------------------------------------------------
// Debounce loop
// ---------------------------------------------------------------------------

/// Run the debounce loop until `cancel` fires or the event source closes.
///
/// - A matching path moves the machine to `Pending` or resets its deadline.
/// - When the deadline passes, `handler` is awaited inline, so invocations
///   never overlap; events arriving meanwhile start the next cycle.
/// - Cancellation drops a pending deadline and never interrupts a running
///   handler; no invocation starts after cancellation is observed.
/// - If the source closes while a deadline is pending, that last
///   notification is still delivered before the loop exits.
pub async fn run_debounce_loop(
    mut events: mpsc::Receiver<PathBuf>,
    filter: WatchFilter,
    delay: Duration,
    handler: Arc<dyn NotificationHandler>,
    cancel: CancellationToken,
) {
    let mut state = DebounceState::Idle;
    let mut source_closed = false;

    loop {
        if source_closed && state.is_idle() {
            tracing::debug!("Watch event source closed, debounce loop exiting");
            break;
        }
        let deadline = state.deadline();

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if !state.is_idle() {
                    tracing::debug!("Pending notification cancelled");
                }
                state.cancel();
                break;
            }

            received = events.recv(), if !source_closed => match received {
                Some(path) => {
                    if filter.matches(&path) {
                        tracing::trace!(path = %path.display(), "Matching change event");
                        state.on_event(Instant::now(), delay);
                    }
                }
                None => source_closed = true,
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if state.poll(Instant::now()) {
                    tracing::debug!("Quiet period elapsed, notifying handler");
                    handler.notify().await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DirectoryWatcher
// ---------------------------------------------------------------------------

/// A running watch on one directory.
///
/// Owned by whoever starts it; dropping it without [`stop`](Self::stop)
/// deregisters the OS watch, which closes the event source.
pub struct DirectoryWatcher {
    dir: PathBuf,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    /// Never read, but dropping it deregisters the OS watch.
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Start watching `dir` (non-recursively) and notify `handler` after
    /// each burst of events whose file name matches `pattern` has been quiet
    /// for `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        dir: &Path,
        pattern: Regex,
        delay: Duration,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<Self, WatcherError> {
        // notify reports paths under the directory as given; canonicalise so
        // the parent comparison in WatchFilter is exact.
        let dir = std::fs::canonicalize(dir).map_err(|source| WatcherError::Directory {
            dir: dir.to_path_buf(),
            source,
        })?;

        let (tx, rx) = mpsc::channel::<PathBuf>(CHANNEL_CAPACITY);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths {
                        if tx.try_send(path).is_err() {
                            tracing::trace!("Watch channel full or closed, dropping raw event");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Filesystem watcher error");
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_debounce_loop(
            rx,
            WatchFilter::new(dir.clone(), pattern),
            delay,
            handler,
            cancel.clone(),
        ));

        tracing::info!(
            dir = %dir.display(),
            debounce_ms = delay.as_millis() as u64,
            "Directory watcher started"
        );

        Ok(Self {
            dir,
            cancel,
            task,
            _watcher: watcher,
        })
    }

    /// The canonical directory being watched.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stop watching.
    ///
    /// Cancels any pending notification and waits for an in-flight handler
    /// call to finish. No handler call starts after this returns.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Debounce loop task failed");
        }
        tracing::info!(dir = %self.dir.display(), "Directory watcher stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
