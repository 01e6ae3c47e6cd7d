use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{Error, Result};

const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    AlbumChanged,
}

/// Keeps a debounced watch on the album directory. Events are forwarded to
/// the channel, never handled on the watcher thread. Dropping the watcher
/// unsubscribes.
pub struct AlbumWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl AlbumWatcher {
    pub fn start(album_dir: &Path, events: UnboundedSender<ChangeEvent>) -> Result<Self> {
        let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
            Ok(batch) if !batch.is_empty() => {
                debug!("album changed ({} events)", batch.len());
                if events.send(ChangeEvent::AlbumChanged).is_err() {
                    debug!("change receiver dropped, ignoring album event");
                }
            }
            Ok(_) => {}
            Err(err) => warn!("album watcher error: {err}"),
        })
        .map_err(|err| Error::Watch(format!("failed to create debouncer: {err}")))?;

        debouncer
            .watcher()
            .watch(album_dir, RecursiveMode::Recursive)
            .map_err(|err| Error::Watch(format!("failed to watch {}: {err}", album_dir.display())))?;

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_changes_in_album_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _watcher = AlbumWatcher::start(dir.path(), tx).unwrap();

        std::fs::write(dir.path().join("new.jpg"), b"x").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no change event within timeout");
        assert_eq!(event, Some(ChangeEvent::AlbumChanged));
    }
}
