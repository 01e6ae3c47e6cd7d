use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use lumaloop_core::crop::{CropOutcome, CropTool, PermissionBroker};
use lumaloop_core::db::SqliteStore;
use lumaloop_core::gallery::GalleryController;
use lumaloop_core::media_store::LocalMediaStore;
use lumaloop_core::metadata;
use lumaloop_core::settings::SettingsStore;
use lumaloop_core::thumbnail::render_thumbnail;
use lumaloop_core::video::FfmpegFrameExtractor;
use lumaloop_core::watch::{AlbumWatcher, ChangeEvent};
use lumaloop_core::{Error, IngestProgress, IngestReport, MediaFilter, MediaItem, MediaUri, Result, SortOption};
use serde::Serialize;

const DB_FILE: &str = "lumaloop.db";
const LEGACY_DIR: &str = "slideshow_media";
const CACHE_DIR: &str = "cache";
const DEFAULT_THUMB_SIZE: u32 = 256;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = real_main() {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
}

fn real_main() -> Result<()> {
    let mut args = std::env::args().skip(1).peekable();
    let mut data_dir: Option<PathBuf> = None;
    if args.peek().map(String::as_str) == Some("--data") {
        args.next();
        data_dir = Some(
            args.next()
                .map(PathBuf::from)
                .ok_or_else(|| Error::InvalidArgument("missing --data <dir>".to_string()))?,
        );
    }

    let Some(cmd) = args.next() else {
        print_help();
        return Ok(());
    };
    let rest: Vec<String> = args.collect();

    if matches!(cmd.as_str(), "--help" | "-h" | "help") {
        print_help();
        return Ok(());
    }

    let data_dir = match data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    match cmd.as_str() {
        "list" => cmd_list(&data_dir, &rest),
        "add" => cmd_add(&data_dir, &rest, false),
        "share" => cmd_add(&data_dir, &rest, true),
        "remove" => cmd_remove(&data_dir, &rest),
        "replace" => cmd_replace(&data_dir, &rest),
        "sync" => cmd_sync(&data_dir),
        "startup" => cmd_startup(&data_dir),
        "watch" => cmd_watch(&data_dir),
        "thumb" => cmd_thumb(&data_dir, &rest),
        "crop" => cmd_crop(&data_dir, &rest),
        "settings" => cmd_settings(&data_dir, &rest),
        _ => Err(Error::InvalidArgument(format!("unknown command: {cmd}"))),
    }
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("lumaloop"))
        .ok_or_else(|| Error::InvalidArgument("no data directory, pass --data <dir>".to_string()))
}

struct App {
    data_dir: PathBuf,
    media: Arc<LocalMediaStore>,
    gallery: GalleryController,
}

fn open_app(data_dir: &Path) -> Result<App> {
    let media = Arc::new(LocalMediaStore::new(data_dir)?);
    let store = SqliteStore::open(&media.root().join(DB_FILE))?;
    let gallery = GalleryController::new(store, media.clone());
    Ok(App {
        data_dir: media.root().to_path_buf(),
        media,
        gallery,
    })
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Accepts either a URI (`scheme://...`) or a local path.
fn to_uri(arg: &str) -> MediaUri {
    if arg.contains("://") {
        return MediaUri::new(arg);
    }
    let path = Path::new(arg);
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    });
    MediaUri::from_path(&absolute)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{text}");
    Ok(())
}

fn cmd_list(data_dir: &Path, args: &[String]) -> Result<()> {
    let mut filter = MediaFilter::All;
    let mut sort = SortOption::DateDesc;
    let mut json = false;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--filter" => filter = required(it.next(), "--filter <all|images|videos>")?.parse()?,
            "--sort" => sort = required(it.next(), "--sort <order>")?.parse()?,
            "--json" => json = true,
            _ => return Err(Error::InvalidArgument(format!("unknown arg: {arg}"))),
        }
    }

    let mut app = open_app(data_dir)?;
    app.gallery.reload();
    app.gallery.set_sort_option(sort);
    app.gallery.set_filter(filter);
    let state = app.gallery.state();
    let items: Vec<&MediaItem> = state.visible_items();

    if json {
        return print_json(&items);
    }
    for item in &items {
        let kind = if item.is_video { "video" } else { "image" };
        println!("{kind}\t{}\t{}\t{}", item.last_modified, item.name, item.uri);
    }
    println!("{} of {} items", items.len(), state.media_items.len());
    Ok(())
}

fn cmd_add(data_dir: &Path, args: &[String], shared: bool) -> Result<()> {
    if args.is_empty() {
        return Err(Error::InvalidArgument("nothing to add".to_string()));
    }
    let uris: Vec<MediaUri> = args.iter().map(|arg| to_uri(arg)).collect();
    let mut app = open_app(data_dir)?;
    app.gallery.reload();

    let rt = runtime()?;
    let report = if shared {
        rt.block_on(app.gallery.process_shared_media(uris))?
    } else {
        rt.block_on(
            app.gallery
                .add_media_with_progress(uris, |p: &IngestProgress| {
                    if p.total_files > 0 && !p.current_file_name.is_empty() {
                        info!(
                            "[{}/{}] {}",
                            p.processed_files, p.total_files, p.current_file_name
                        );
                    }
                }),
        )?
    };
    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "requested: {}, skipped: {}, copied: {}, kept original: {}",
        report.requested, report.skipped_existing, report.copied, report.fell_back
    );
    for uri in &report.added {
        println!("added {uri}");
    }
}

fn cmd_remove(data_dir: &Path, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(Error::InvalidArgument("nothing to remove".to_string()));
    }
    let mut app = open_app(data_dir)?;
    app.gallery.reload();
    for arg in args {
        app.gallery.toggle_selection(&to_uri(arg));
    }
    let removed = app.gallery.remove_selected()?;
    println!("removed {removed} items");
    Ok(())
}

fn cmd_replace(data_dir: &Path, args: &[String]) -> Result<()> {
    let [old, new] = args else {
        return Err(Error::InvalidArgument("usage: replace <old> <new>".to_string()));
    };
    let mut app = open_app(data_dir)?;
    app.gallery.replace_media(&to_uri(old), &to_uri(new))?;
    println!("replaced {old}");
    Ok(())
}

fn cmd_sync(data_dir: &Path) -> Result<()> {
    let mut app = open_app(data_dir)?;
    let removed = app.gallery.handle_change(ChangeEvent::AlbumChanged);
    for uri in &removed {
        println!("removed {uri}");
    }
    println!("{} stale entries removed", removed.len());
    Ok(())
}

fn cmd_startup(data_dir: &Path) -> Result<()> {
    let mut app = open_app(data_dir)?;
    let legacy = app.data_dir.join(LEGACY_DIR);
    let report = app
        .gallery
        .run_startup_maintenance(legacy.is_dir().then_some(legacy.as_path()));
    println!(
        "migrated: {}, failed: {}, legacy entries removed: {}, duplicates pruned: {}",
        report.migration.migrated,
        report.migration.failed,
        report.migration.removed_legacy,
        report.duplicates_pruned
    );
    Ok(())
}

fn cmd_watch(data_dir: &Path) -> Result<()> {
    let mut app = open_app(data_dir)?;
    app.gallery.reload();
    let rt = runtime()?;

    rt.block_on(async move {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _watcher = AlbumWatcher::start(app.media.album_dir(), tx)?;
        info!(
            "watching {} ({} items)",
            app.media.album_dir().display(),
            app.gallery.state().media_items.len()
        );

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let removed =
                        tokio::task::block_in_place(|| app.gallery.handle_change(event));
                    info!(
                        "album changed: {} removed, {} items",
                        removed.len(),
                        app.gallery.state().media_items.len()
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("stopping watch");
                    break;
                }
            }
        }
        Ok::<(), Error>(())
    })
}

fn cmd_thumb(data_dir: &Path, args: &[String]) -> Result<()> {
    let mut size = DEFAULT_THUMB_SIZE;
    let mut positional = Vec::new();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--size" => {
                let value = required(it.next(), "--size <pixels>")?;
                size = value
                    .parse()
                    .map_err(|_| Error::InvalidArgument(format!("invalid size: {value}")))?;
            }
            _ => positional.push(arg),
        }
    }
    let [uri, out] = positional.as_slice() else {
        return Err(Error::InvalidArgument(
            "usage: thumb <uri> <out.png> [--size N]".to_string(),
        ));
    };

    let app = open_app(data_dir)?;
    let uri = to_uri(uri);
    let resolver = app.gallery.resolver().as_ref();
    let info = metadata::resolve(resolver, &uri);
    let item = MediaItem {
        uri: uri.clone(),
        is_video: info.is_video,
        name: info.name,
        last_modified: info.last_modified,
    };
    let png = render_thumbnail(resolver, &FfmpegFrameExtractor::default(), &item, size)
        .ok_or(Error::NotFound(uri))?;
    fs::write(out, png)?;
    println!("wrote {out}");
    Ok(())
}

/// Copies an already cropped file into the cache, standing in for the
/// cropping tool's output.
struct FileCropTool {
    cropped: PathBuf,
    cache_dir: PathBuf,
}

impl CropTool for FileCropTool {
    fn crop(&self, _source: &MediaUri) -> Result<Option<MediaUri>> {
        fs::create_dir_all(&self.cache_dir)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let ext = self
            .cropped
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("jpg");
        let temp = self.cache_dir.join(format!("crop_{millis}.{ext}"));
        fs::copy(&self.cropped, &temp)?;
        Ok(Some(MediaUri::from_path(&temp)))
    }
}

/// Asks on the terminal before overwriting files outside the data directory.
struct PromptBroker {
    media: Arc<LocalMediaStore>,
}

impl PermissionBroker for PromptBroker {
    fn request_write_consent(&self, uri: &MediaUri) -> bool {
        print!("allow overwriting {uri}? [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if let Err(err) = io::stdin().lock().read_line(&mut answer) {
            warn!("failed to read answer: {err}");
            return false;
        }
        let granted = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
        if granted {
            self.media.grant_write(uri);
        }
        granted
    }
}

fn cmd_crop(data_dir: &Path, args: &[String]) -> Result<()> {
    let [target, cropped] = args else {
        return Err(Error::InvalidArgument(
            "usage: crop <uri> <cropped-file>".to_string(),
        ));
    };
    let mut app = open_app(data_dir)?;
    app.gallery.reload();
    let tool = FileCropTool {
        cropped: PathBuf::from(cropped),
        cache_dir: app.data_dir.join(CACHE_DIR),
    };
    let broker = PromptBroker {
        media: app.media.clone(),
    };
    match app.gallery.crop_replace(&to_uri(target), &tool, &broker)? {
        CropOutcome::Replaced => println!("replaced {target}"),
        CropOutcome::Cancelled => println!("crop cancelled"),
        CropOutcome::Abandoned => println!("kept original {target}"),
    }
    Ok(())
}

fn cmd_settings(data_dir: &Path, args: &[String]) -> Result<()> {
    let media = LocalMediaStore::new(data_dir)?;
    let db = SqliteStore::open(&media.root().join(DB_FILE))?;
    let mut settings = SettingsStore::load(db)?;

    match args {
        [] => print_json(settings.current()),
        [cmd] if cmd == "show" => print_json(settings.current()),
        [cmd, key, value] if cmd == "set" => {
            settings.set_from_str(key, value)?;
            print_json(settings.current())
        }
        _ => Err(Error::InvalidArgument(
            "usage: settings show | settings set <key> <value>".to_string(),
        )),
    }
}

fn required<'a>(value: Option<&'a String>, usage: &str) -> Result<&'a str> {
    value
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidArgument(format!("missing {usage}")))
}

fn print_help() {
    println!(
        r#"lumaloop

USAGE:
  lumaloop [--data <dir>] <command>

COMMANDS:
  list [--filter all|images|videos] [--sort date-desc|date-asc|name-asc|name-desc] [--json]
  add <path-or-uri>...          copy media into the album and the slideshow
  share <path-or-uri>...        same as add, for URIs handed over by a share
  remove <uri>...               drop items (album copies are deleted)
  replace <old> <new>           swap one stored URI for another
  sync                          drop entries whose album file is gone
  startup                       migrate legacy media and prune duplicates
  watch                         keep the slideshow in sync until Ctrl-C
  thumb <uri> <out.png> [--size N]
  crop <uri> <cropped-file>     overwrite an item with a cropped image
  settings show | settings set <key> <value>

NOTES:
  - Data defaults to the platform data directory (lumaloop/).
  - The album lives at <data>/Pictures/LumaLoop.
  - Set RUST_LOG=debug for verbose logging.
"#
    );
}
