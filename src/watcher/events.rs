use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Created or changed.
    Modified,
    Deleted,
}

/// One filesystem change under a watched tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Modified,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Deleted,
        }
    }
}

/// Translate a notify event. A rename becomes a delete of the old path and a
/// change of the new one. Access and other events map to nothing.
pub fn map_notify_event(event: Event) -> Vec<WatchEvent> {
    let Event { kind, paths, .. } = event;
    if let EventKind::Modify(ModifyKind::Name(mode)) = kind {
        return map_rename(paths, mode);
    }

    let kind = match kind {
        EventKind::Create(_) | EventKind::Modify(_) => WatchEventKind::Modified,
        EventKind::Remove(_) => WatchEventKind::Deleted,
        _ => return Vec::new(),
    };
    paths
        .into_iter()
        .map(|path| WatchEvent { path, kind })
        .collect()
}

fn map_rename(paths: Vec<PathBuf>, mode: RenameMode) -> Vec<WatchEvent> {
    match mode {
        RenameMode::Both => {
            let mut events = Vec::with_capacity(2);
            if let Some(from) = paths.first() {
                events.push(WatchEvent::deleted(from.clone()));
            }
            if let Some(to) = paths.get(1) {
                events.push(WatchEvent::modified(to.clone()));
            }
            events
        }
        RenameMode::From => paths.into_iter().map(WatchEvent::deleted).collect(),
        RenameMode::To => paths.into_iter().map(WatchEvent::modified).collect(),
        RenameMode::Any | RenameMode::Other => paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    WatchEvent::modified(path)
                } else {
                    WatchEvent::deleted(path)
                }
            })
            .collect(),
    }
}
