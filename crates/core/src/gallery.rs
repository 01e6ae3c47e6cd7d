use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::crop::{self, CropOutcome, CropTool, PermissionBroker};
use crate::error::{Error, Result};
use crate::ingest::{self, BatchEvent, MAX_CONCURRENT_TRANSFERS};
use crate::metadata;
use crate::models::{
    IngestProgress, IngestReport, MaintenanceReport, MediaFilter, MediaItem, MediaUri, SortOption,
};
use crate::reconcile;
use crate::resolver::ContentResolver;
use crate::store::UriStore;
use crate::watch::ChangeEvent;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalleryState {
    pub media_items: Vec<MediaItem>,
    pub selected_items: HashSet<MediaUri>,
    pub current_filter: MediaFilter,
    pub sort_option: SortOption,
    pub is_loading: bool,
    pub loading_progress: f32,
    pub current_file_name: String,
    pub total_files: usize,
    pub processed_files: usize,
}

impl GalleryState {
    pub fn visible_items(&self) -> Vec<&MediaItem> {
        self.media_items
            .iter()
            .filter(|item| self.current_filter.accepts(item))
            .collect()
    }

    pub fn progress(&self) -> IngestProgress {
        IngestProgress {
            total_files: self.total_files,
            processed_files: self.processed_files,
            current_file_name: self.current_file_name.clone(),
            loading_progress: self.loading_progress,
        }
    }
}

pub fn filter_items(items: &[MediaItem], filter: MediaFilter) -> Vec<MediaItem> {
    items
        .iter()
        .filter(|item| filter.accepts(item))
        .cloned()
        .collect()
}

/// Stable sort; names compare byte-wise, so case matters.
pub fn sort_media_items(mut items: Vec<MediaItem>, option: SortOption) -> Vec<MediaItem> {
    match option {
        SortOption::DateDesc => items.sort_by(|a, b| b.last_modified.cmp(&a.last_modified)),
        SortOption::DateAsc => items.sort_by(|a, b| a.last_modified.cmp(&b.last_modified)),
        SortOption::NameAsc => items.sort_by(|a, b| a.name.cmp(&b.name)),
        SortOption::NameDesc => items.sort_by(|a, b| b.name.cmp(&a.name)),
    }
    items
}

pub struct GalleryController {
    store: Box<dyn UriStore + Send>,
    resolver: Arc<dyn ContentResolver>,
    state: watch::Sender<GalleryState>,
    shared_seen: HashSet<MediaUri>,
    max_concurrent: usize,
}

impl GalleryController {
    pub fn new(store: impl UriStore + Send + 'static, resolver: Arc<dyn ContentResolver>) -> Self {
        let (state, _) = watch::channel(GalleryState::default());
        Self {
            store: Box::new(store),
            resolver,
            state,
            shared_seen: HashSet::new(),
            max_concurrent: MAX_CONCURRENT_TRANSFERS,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<GalleryState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> GalleryState {
        self.state.borrow().clone()
    }

    pub fn stored_uris(&self) -> Vec<MediaUri> {
        self.store.all()
    }

    pub fn resolver(&self) -> &Arc<dyn ContentResolver> {
        &self.resolver
    }

    /// Stale URIs are dropped from the store on the way.
    pub fn reload(&mut self) {
        let scan = scan_items(self.resolver.as_ref(), self.store.all());
        self.apply_scan(scan);
    }

    pub async fn reload_async(&mut self) -> Result<()> {
        let resolver = self.resolver.clone();
        let uris = self.store.all();
        let scan = tokio::task::spawn_blocking(move || scan_items(resolver.as_ref(), uris))
            .await
            .map_err(|err| Error::Join(err.to_string()))?;
        self.apply_scan(scan);
        Ok(())
    }

    fn apply_scan(&mut self, scan: ItemScan) {
        for uri in &scan.stale {
            warn!("invalid URI, removing: {uri}");
            if let Err(err) = self.store.remove(uri) {
                warn!("failed to remove stale URI {uri}: {err}");
            }
        }

        self.state.send_modify(|state| {
            state.media_items = sort_media_items(scan.items, state.sort_option);
            state.selected_items.clear();
        });
    }

    pub fn set_sort_option(&mut self, option: SortOption) {
        self.state.send_modify(|state| {
            let items = std::mem::take(&mut state.media_items);
            state.media_items = sort_media_items(items, option);
            state.sort_option = option;
        });
    }

    pub fn toggle_selection(&mut self, uri: &MediaUri) {
        self.state.send_modify(|state| {
            if !state.selected_items.remove(uri) {
                state.selected_items.insert(uri.clone());
            }
        });
    }

    pub fn select_all(&mut self) {
        self.state.send_modify(|state| {
            state.selected_items = state
                .visible_items()
                .into_iter()
                .map(|item| item.uri.clone())
                .collect();
        });
    }

    pub fn deselect_all(&mut self) {
        self.state.send_modify(|state| state.selected_items.clear());
    }

    pub fn set_filter(&mut self, filter: MediaFilter) {
        self.state.send_modify(|state| {
            state.current_filter = filter;
            state.selected_items.clear();
        });
    }

    pub async fn add_media(&mut self, uris: Vec<MediaUri>) -> Result<IngestReport> {
        self.add_media_with_progress(uris, |_| {}).await
    }

    /// Loading state is reset before this returns, whatever the outcome.
    pub async fn add_media_with_progress<F>(
        &mut self,
        uris: Vec<MediaUri>,
        mut on_progress: F,
    ) -> Result<IngestReport>
    where
        F: FnMut(&IngestProgress),
    {
        let current: HashSet<MediaUri> = self.store.all().into_iter().collect();
        let mut seen = HashSet::new();
        let requested = uris.len();
        let to_process: Vec<MediaUri> = uris
            .into_iter()
            .filter(|uri| !current.contains(uri) && seen.insert(uri.clone()))
            .filter(|uri| {
                self.store
                    .stored_for(uri)
                    .map_or(true, |stored| !current.contains(&stored))
            })
            .collect();

        let mut report = IngestReport {
            requested,
            skipped_existing: requested - to_process.len(),
            ..IngestReport::default()
        };
        if to_process.is_empty() {
            debug!("all {requested} URIs already exist, skipping");
            return Ok(report);
        }

        let total = to_process.len();
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.total_files = total;
            state.processed_files = 0;
            state.loading_progress = 0.0;
            state.current_file_name.clear();
        });
        on_progress(&self.state.borrow().progress());

        let result = self
            .ingest_batch(to_process, &current, &mut report, &mut on_progress)
            .await;

        self.state.send_modify(|state| {
            state.is_loading = false;
            state.total_files = 0;
            state.processed_files = 0;
            state.loading_progress = 0.0;
            state.current_file_name.clear();
        });

        result.map(|()| report)
    }

    async fn ingest_batch<F>(
        &mut self,
        to_process: Vec<MediaUri>,
        current: &HashSet<MediaUri>,
        report: &mut IngestReport,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&IngestProgress),
    {
        let total = to_process.len();
        let state = &self.state;
        let mut processed = 0usize;

        let outcomes = ingest::copy_batch(
            self.resolver.clone(),
            to_process,
            self.max_concurrent,
            |event| {
                match event {
                    BatchEvent::Started { display_name, .. } => {
                        state.send_modify(|s| s.current_file_name = display_name.clone());
                    }
                    BatchEvent::Finished(_) => {
                        processed += 1;
                        state.send_modify(|s| {
                            s.processed_files = processed;
                            s.loading_progress = processed as f32 / total as f32;
                        });
                    }
                }
                let snapshot = state.borrow().progress();
                on_progress(&snapshot);
            },
        )
        .await?;

        for outcome in &outcomes {
            if outcome.copied {
                report.copied += 1;
                self.store.record_origin(&outcome.source, &outcome.stored)?;
            } else {
                report.fell_back += 1;
            }
            if !current.contains(&outcome.stored) {
                self.store.add(&outcome.stored)?;
                report.added.push(outcome.stored.clone());
            }
        }
        info!(
            "imported {} items ({} copied, {} kept as original)",
            outcomes.len(),
            report.copied,
            report.fell_back
        );

        self.reload_async().await
    }

    pub async fn process_shared_media(&mut self, uris: Vec<MediaUri>) -> Result<IngestReport> {
        let requested = uris.len();
        let fresh: Vec<MediaUri> = uris
            .into_iter()
            .filter(|uri| self.shared_seen.insert(uri.clone()))
            .collect();
        if fresh.is_empty() {
            debug!("all {requested} shared URIs already processed, skipping");
            return Ok(IngestReport {
                requested,
                skipped_existing: requested,
                ..IngestReport::default()
            });
        }

        debug!("processing {} new shared URIs", fresh.len());
        let mut report = self.add_media(fresh).await?;
        report.skipped_existing += requested - report.requested;
        report.requested = requested;
        Ok(report)
    }

    pub fn remove_item(&mut self, uri: &MediaUri) -> Result<()> {
        self.store.remove(uri)?;
        self.reload();
        Ok(())
    }

    // Only album copies are deleted from storage.
    pub fn remove_selected(&mut self) -> Result<usize> {
        let selected: Vec<MediaUri> = self.state.borrow().selected_items.iter().cloned().collect();
        for uri in &selected {
            if self.resolver.is_album_member(uri) {
                match self.resolver.delete(uri) {
                    Ok(()) => debug!("deleted file from storage: {uri}"),
                    Err(err) => error!("failed to delete file {uri}: {err}"),
                }
            }
            self.store.remove(uri)?;
        }
        self.reload();
        self.deselect_all();
        Ok(selected.len())
    }

    pub fn replace_media(&mut self, old: &MediaUri, new: &MediaUri) -> Result<()> {
        self.store.remove(old)?;
        self.store.add(new)?;
        self.reload();
        self.deselect_all();
        Ok(())
    }

    // An unreadable timestamp counts as "modified now".
    pub fn refresh_item(&mut self, uri: &MediaUri) {
        let existing = self
            .state
            .borrow()
            .media_items
            .iter()
            .find(|item| &item.uri == uri)
            .cloned();
        let Some(mut item) = existing else {
            warn!("item to refresh not found: {uri}, reloading all");
            self.reload();
            return;
        };

        let mut last_modified = now_secs();
        match self.resolver.query_info(uri) {
            Ok(info) => {
                if let Some(name) = info.display_name {
                    item.name = name;
                }
                if let Some(modified) = info.date_modified {
                    last_modified = modified;
                }
            }
            Err(err) => error!("error refreshing file info for {uri}: {err}"),
        }
        item.last_modified = last_modified;

        self.state.send_modify(|state| {
            let mut items = std::mem::take(&mut state.media_items);
            if let Some(slot) = items.iter_mut().find(|i| i.uri == item.uri) {
                *slot = item;
            }
            state.media_items = sort_media_items(items, state.sort_option);
        });
        debug!("refreshed single item: {uri}");
    }

    pub fn crop_replace(
        &mut self,
        target: &MediaUri,
        tool: &dyn CropTool,
        broker: &dyn PermissionBroker,
    ) -> Result<CropOutcome> {
        let Some(cropped) = tool.crop(target)? else {
            debug!("crop of {target} cancelled");
            return Ok(CropOutcome::Cancelled);
        };

        let outcome = crop::apply_crop(self.resolver.as_ref(), broker, &cropped, target);
        if outcome == CropOutcome::Replaced {
            self.refresh_item(target);
        }
        Ok(outcome)
    }

    pub fn handle_change(&mut self, event: ChangeEvent) -> Vec<MediaUri> {
        match event {
            ChangeEvent::AlbumChanged => {
                debug!("album changed, syncing gallery");
                let removed =
                    match reconcile::sync_with_album(self.store.as_mut(), self.resolver.as_ref()) {
                        Ok(removed) => removed,
                        Err(err) => {
                            error!("sync error: {err}");
                            Vec::new()
                        }
                    };
                self.reload();
                removed
            }
        }
    }

    pub fn run_startup_maintenance(&mut self, legacy_dir: Option<&Path>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        if let Some(dir) = legacy_dir {
            match reconcile::migrate_legacy(self.store.as_mut(), self.resolver.as_ref(), dir) {
                Ok(migration) => report.migration = migration,
                Err(err) => error!("migration error: {err}"),
            }
        }

        match reconcile::prune_duplicates(self.store.as_mut()) {
            Ok(pruned) => report.duplicates_pruned = pruned,
            Err(err) => error!("cleanup error: {err}"),
        }

        self.reload();
        report
    }
}

struct ItemScan {
    items: Vec<MediaItem>,
    stale: Vec<MediaUri>,
}

fn scan_items(resolver: &dyn ContentResolver, uris: Vec<MediaUri>) -> ItemScan {
    let mut scan = ItemScan {
        items: Vec::with_capacity(uris.len()),
        stale: Vec::new(),
    };
    for uri in uris {
        if !metadata::is_readable(resolver, &uri) {
            scan.stale.push(uri);
            continue;
        }
        let info = metadata::resolve(resolver, &uri);
        scan.items.push(MediaItem {
            uri,
            is_video: info.is_video,
            name: info.name,
            last_modified: info.last_modified,
        });
    }
    scan
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
