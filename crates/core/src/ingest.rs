use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Semaphore;

use crate::album;
use crate::error::{Error, Result};
use crate::metadata;
use crate::models::MediaUri;
use crate::resolver::ContentResolver;

pub const MAX_CONCURRENT_TRANSFERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub index: usize,
    pub source: MediaUri,
    /// Album copy, or `source` itself when the copy failed.
    pub stored: MediaUri,
    pub display_name: String,
    pub copied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started { index: usize, display_name: String },
    Finished(ItemOutcome),
}

/// `on_event` runs on the calling task. Outcomes come back in input order.
pub async fn copy_batch<F>(
    resolver: Arc<dyn ContentResolver>,
    sources: Vec<MediaUri>,
    max_concurrent: usize,
    mut on_event: F,
) -> Result<Vec<ItemOutcome>>
where
    F: FnMut(&BatchEvent),
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tasks = Vec::with_capacity(sources.len());

    for (index, source) in sources.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let resolver = resolver.clone();
        let tx = tx.clone();
        tasks.push(tokio::spawn(async move {
            let permit = semaphore.acquire_owned().await.ok();
            let worker_tx = tx.clone();
            let worker_source = source.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                import_one(resolver.as_ref(), &worker_source, index, &worker_tx)
            })
            .await;

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("import worker for {source} failed, keeping original: {err}");
                    ItemOutcome {
                        index,
                        stored: source.clone(),
                        source,
                        display_name: placeholder_name(index),
                        copied: false,
                    }
                }
            };
            let _ = tx.send(BatchEvent::Finished(outcome));
        }));
    }
    drop(tx);

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(event) = rx.recv().await {
        on_event(&event);
        if let BatchEvent::Finished(outcome) = event {
            outcomes.push(outcome);
        }
    }

    for task in tasks {
        task.await.map_err(|err| Error::Join(err.to_string()))?;
    }

    outcomes.sort_by_key(|outcome| outcome.index);
    Ok(outcomes)
}

fn import_one(
    resolver: &dyn ContentResolver,
    source: &MediaUri,
    index: usize,
    events: &UnboundedSender<BatchEvent>,
) -> ItemOutcome {
    let original = metadata::display_name(resolver, source);
    let display_name = original.clone().unwrap_or_else(|| placeholder_name(index));
    let _ = events.send(BatchEvent::Started {
        index,
        display_name: display_name.clone(),
    });

    let base_name = original.as_deref().map(metadata::strip_extension);
    match album::copy_to_album(resolver, source, base_name) {
        Ok(stored) => {
            debug!("added {stored} for {source}");
            ItemOutcome {
                index,
                source: source.clone(),
                stored,
                display_name,
                copied: true,
            }
        }
        Err(err) => {
            warn!("failed to copy {source} to album, using original: {err}");
            ItemOutcome {
                index,
                source: source.clone(),
                stored: source.clone(),
                display_name,
                copied: false,
            }
        }
    }
}

pub fn placeholder_name(index: usize) -> String {
    format!("file {}", index + 1)
}
