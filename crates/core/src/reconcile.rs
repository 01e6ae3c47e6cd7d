use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::album;
use crate::error::Result;
use crate::models::{MediaUri, MigrationReport};
use crate::resolver::ContentResolver;
use crate::store::UriStore;

/// First occurrence wins.
pub fn prune_duplicates(store: &mut dyn UriStore) -> Result<bool> {
    let all = store.all();
    let mut seen = HashSet::with_capacity(all.len());
    let unique: Vec<MediaUri> = all
        .iter()
        .filter(|uri| seen.insert((*uri).clone()))
        .cloned()
        .collect();

    if unique.len() == all.len() {
        return Ok(false);
    }

    info!(
        "found {} duplicate entries, rewriting store",
        all.len() - unique.len()
    );
    for uri in &unique {
        store.remove(uri)?;
    }
    for uri in &unique {
        store.add(uri)?;
    }
    Ok(true)
}

// URIs outside the album are left alone; new album files are not imported.
pub fn sync_with_album(
    store: &mut dyn UriStore,
    resolver: &dyn ContentResolver,
) -> Result<Vec<MediaUri>> {
    let live: HashSet<MediaUri> = resolver.album_content()?.into_iter().collect();

    let mut removed = Vec::new();
    for uri in store.all() {
        if resolver.is_album_member(&uri) && !live.contains(&uri) {
            debug!("file deleted externally, removing: {uri}");
            store.remove(&uri)?;
            removed.push(uri);
        }
    }
    Ok(removed)
}

/// Every store entry pointing into `legacy_dir` is dropped afterwards,
/// including those of files that failed to migrate.
pub fn migrate_legacy(
    store: &mut dyn UriStore,
    resolver: &dyn ContentResolver,
    legacy_dir: &Path,
) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();
    if !legacy_dir.is_dir() {
        debug!("no private files to migrate");
        return Ok(report);
    }

    let files: Vec<_> = WalkDir::new(legacy_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    if !files.is_empty() {
        info!(
            "migrating {} files from {}",
            files.len(),
            legacy_dir.display()
        );
    }
    for path in files {
        let Some(source) = MediaUri::try_from_path(&path) else {
            report.failed += 1;
            warn!("skipping non UTF-8 legacy file {}", path.display());
            continue;
        };
        let base_name = path.file_stem().and_then(|s| s.to_str());
        let migrated = album::copy_to_album(resolver, &source, base_name).and_then(|target| {
            fs::remove_file(&path)?;
            Ok(target)
        });
        match migrated {
            Ok(target) => {
                store.add(&target)?;
                report.migrated += 1;
                debug!("migrated {}", path.display());
            }
            Err(err) => {
                report.failed += 1;
                error!("failed to migrate {}: {err}", path.display());
            }
        }
    }

    for uri in store.all() {
        if uri
            .to_file_path()
            .is_some_and(|path| path.starts_with(legacy_dir))
        {
            store.remove(&uri)?;
            report.removed_legacy += 1;
        }
    }

    if report != MigrationReport::default() {
        info!(
            "migration complete: {} migrated, {} failed, {} legacy entries removed",
            report.migrated, report.failed, report.removed_legacy
        );
    }
    Ok(report)
}
