use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::model::view::ViewId;

/// Events from the session watcher.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session file was written by some process.
    Changed,
}

/// Watches session.json so focus changes made by other processes can be
/// reported as view activations.
pub struct SessionWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<SessionEvent>,
}

impl SessionWatcher {
    /// Start watching `session_file`. Its directory must exist.
    pub fn start(session_file: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();
        let target: PathBuf = session_file.to_path_buf();
        let dir = session_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let Ok(event) = result else {
                    return;
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                // Editors and serde writers may replace the file, so match by name
                let touched = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == target.file_name());
                if touched {
                    let _ = tx.send(SessionEvent::Changed);
                }
            },
            Config::default(),
        )?;

        // Watch the directory: the file itself may not exist yet
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        Ok(SessionWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Block up to `timeout` for the next event, then drain any queued
    /// behind it. Returns an empty list on timeout.
    pub fn wait(&self, timeout: Duration) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if let Ok(evt) = self.rx.recv_timeout(timeout) {
            events.push(evt);
            while let Ok(evt) = self.rx.try_recv() {
                events.push(evt);
            }
        }
        events
    }
}

/// Turns successive session snapshots into activation events: only a
/// change of the focused view counts. Rewrites that keep focus (fold
/// updates, our own saves) are not activations.
#[derive(Debug, Default)]
pub struct FocusTracker {
    last: Option<ViewId>,
}

impl FocusTracker {
    pub fn new(initial: Option<ViewId>) -> Self {
        FocusTracker { last: initial }
    }

    /// Record the focused view of a fresh snapshot. Returns the view to
    /// activate, if focus moved onto one.
    pub fn observe(&mut self, focused: Option<ViewId>) -> Option<ViewId> {
        if focused == self.last {
            return None;
        }
        self.last = focused.clone();
        focused
    }
}
