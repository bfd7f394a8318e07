use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};
use crate::ports::WatcherControl;
use crate::watcher::events::{map_notify_event, WatchEvent};
use crate::watcher::reconciler::Reconciler;

// ── Pause switch ──

/// Shared pause counter. Pauses nest: events flow again once every pause
/// has been matched by a resume.
#[derive(Debug, Clone, Default)]
pub struct PauseSwitch {
    depth: Arc<AtomicUsize>,
}

impl PauseSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }
}

impl WatcherControl for PauseSwitch {
    fn pause(&self) {
        self.depth.fetch_add(1, Ordering::AcqRel);
    }

    fn resume(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1));
    }
}

/// Pauses a watcher for its lifetime.
pub struct PauseGuard<'a> {
    control: &'a dyn WatcherControl,
}

impl<'a> PauseGuard<'a> {
    pub fn new(control: &'a dyn WatcherControl) -> Self {
        control.pause();
        Self { control }
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.control.resume();
    }
}

// ── Watcher ──

#[derive(Debug, Default)]
struct WatchStats {
    received: AtomicU64,
    dropped: AtomicU64,
}

/// Counters since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub received: u64,
    /// Lost because the queue was full.
    pub dropped: u64,
}

/// One notify watcher per tree feeding a bounded queue, drained by a single
/// thread that runs the reconciler.
///
/// Events that arrive while paused are discarded.
pub struct FileWatcherManager {
    switch: PauseSwitch,
    stats: Arc<WatchStats>,
    watchers: Vec<RecommendedWatcher>,
    consumer: Option<JoinHandle<()>>,
}

impl FileWatcherManager {
    pub fn start(reconciler: Reconciler, buffer: usize) -> Result<Self> {
        let switch = PauseSwitch::new();
        let stats = Arc::new(WatchStats::default());
        let (sender, receiver) = bounded::<WatchEvent>(buffer.max(1));

        let roots: Vec<PathBuf> = reconciler.roots().iter().map(|r| r.to_path_buf()).collect();
        let mut watchers = Vec::with_capacity(roots.len());
        for root in &roots {
            fs::create_dir_all(root)?;
            let mut watcher = build_watcher(sender.clone(), switch.clone(), stats.clone())?;
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| watcher_error(&e))?;
            watchers.push(watcher);
        }
        drop(sender);

        let consumer_switch = switch.clone();
        let consumer = thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || run_consumer(receiver, reconciler, consumer_switch))?;

        info!(roots = ?roots, buffer, "file watcher started");
        Ok(Self {
            switch,
            stats,
            watchers,
            consumer: Some(consumer),
        })
    }

    /// A handle that pauses and resumes this watcher.
    pub fn switch(&self) -> PauseSwitch {
        self.switch.clone()
    }

    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            received: self.stats.received.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop watching and wait for the queue to drain.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.watchers.clear();
        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                warn!("file watcher consumer panicked");
            }
            info!("file watcher stopped");
        }
    }
}

impl Drop for FileWatcherManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_watcher(
    sender: Sender<WatchEvent>,
    switch: PauseSwitch,
    stats: Arc<WatchStats>,
) -> Result<RecommendedWatcher> {
    notify::recommended_watcher(move |event: notify::Result<Event>| {
        if switch.is_paused() {
            return;
        }
        match event {
            Ok(event) => {
                for ev in map_notify_event(event) {
                    stats.received.fetch_add(1, Ordering::Relaxed);
                    match sender.try_send(ev) {
                        Ok(()) => {}
                        Err(TrySendError::Full(ev)) => {
                            stats.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(path = %ev.path.display(), "watch queue full, event dropped");
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            debug!("watch event dropped because consumer is gone");
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "watch backend error"),
        }
    })
    .map_err(|e| watcher_error(&e))
}

fn run_consumer(receiver: Receiver<WatchEvent>, reconciler: Reconciler, switch: PauseSwitch) {
    for event in receiver.iter() {
        if switch.is_paused() {
            debug!(path = %event.path.display(), "paused, event skipped");
            continue;
        }
        let outcome = reconciler.handle(&event);
        debug!(path = %event.path.display(), ?outcome, "reconciled");
    }
}

fn watcher_error(error: &notify::Error) -> ConfigError {
    ConfigError::Io(io::Error::other(format!("watch backend error: {}", error)))
}
