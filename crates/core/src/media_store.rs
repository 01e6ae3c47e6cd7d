use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use log::debug;
use walkdir::WalkDir;

use crate::album::ALBUM_NAME;
use crate::error::{Error, Result};
use crate::models::{ContentInfo, MediaUri, NewMediaEntry};
use crate::resolver::ContentResolver;

const SNIFF_LEN: usize = 8192;

pub struct LocalMediaStore {
    root: PathBuf,
    album_dir: PathBuf,
    pending: Mutex<HashSet<PathBuf>>,
    granted: Mutex<HashSet<PathBuf>>,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("Pictures").join(ALBUM_NAME))?;
        let root = fs::canonicalize(&root)?;
        let album_dir = root.join("Pictures").join(ALBUM_NAME);
        Ok(Self {
            root,
            album_dir,
            pending: Mutex::new(HashSet::new()),
            granted: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn album_dir(&self) -> &Path {
        &self.album_dir
    }

    /// Records the user's consent to overwrite `uri`.
    pub fn grant_write(&self, uri: &MediaUri) {
        if let Some(path) = uri.to_file_path() {
            lock(&self.granted).insert(normalize(&path));
        }
    }

    fn path_of(&self, uri: &MediaUri) -> Result<PathBuf> {
        uri.to_file_path()
            .map(|path| normalize(&path))
            .ok_or_else(|| Error::InvalidArgument(format!("not a file URI: {uri}")))
    }

    fn is_owned(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Creates an empty album file named after `display_name`, adding a
    /// `-n` suffix until the name is free. Creation itself claims the name.
    fn create_album_file(&self, display_name: &str) -> Result<PathBuf> {
        let stem = Path::new(display_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(display_name);
        let ext = Path::new(display_name)
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let mut candidate = self.album_dir.join(display_name);
        let mut n = 0u32;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => return Ok(candidate),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    n += 1;
                    candidate = self.album_dir.join(format!("{stem}-{n}{ext}"));
                }
                Err(err) => return Err(Error::Io(err)),
            }
        }
    }
}

impl ContentResolver for LocalMediaStore {
    fn open_read(&self, uri: &MediaUri) -> Result<Box<dyn Read + Send>> {
        let path = self.path_of(uri)?;
        let file = File::open(&path).map_err(|err| not_found_or_io(err, uri))?;
        if !file.metadata()?.is_file() {
            return Err(Error::NotFound(uri.clone()));
        }
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn open_write(&self, uri: &MediaUri) -> Result<Box<dyn Write + Send>> {
        let path = self.path_of(uri)?;
        if !self.is_owned(&path) && !lock(&self.granted).contains(&path) {
            return Err(Error::PermissionRequired(uri.clone()));
        }
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| not_found_or_io(err, uri))?;
        Ok(Box::new(io::BufWriter::new(file)))
    }

    fn mime_type(&self, uri: &MediaUri) -> Result<Option<String>> {
        let path = self.path_of(uri)?;
        let mut file = File::open(&path).map_err(|err| not_found_or_io(err, uri))?;
        let mut buf = Vec::with_capacity(SNIFF_LEN);
        (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut buf)?;
        if let Some(kind) = infer::get(&buf) {
            return Ok(Some(kind.mime_type().to_string()));
        }
        Ok(mime_from_extension(&path).map(str::to_string))
    }

    fn query_info(&self, uri: &MediaUri) -> Result<ContentInfo> {
        let path = self.path_of(uri)?;
        let md = fs::metadata(&path).map_err(|err| not_found_or_io(err, uri))?;
        let date_modified = md
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
        Ok(ContentInfo {
            display_name: path
                .file_name()
                .map(|name| name.to_string_lossy().to_string()),
            date_modified,
        })
    }

    fn insert(&self, entry: &NewMediaEntry) -> Result<MediaUri> {
        fs::create_dir_all(&self.album_dir)?;
        let path = self.create_album_file(&entry.display_name)?;
        lock(&self.pending).insert(path.clone());
        Ok(MediaUri::from_path(&path))
    }

    fn set_pending(&self, uri: &MediaUri, pending: bool) -> Result<()> {
        let path = self.path_of(uri)?;
        if !path.exists() {
            return Err(Error::NotFound(uri.clone()));
        }
        let mut set = lock(&self.pending);
        if pending {
            set.insert(path);
        } else {
            set.remove(&path);
        }
        Ok(())
    }

    fn delete(&self, uri: &MediaUri) -> Result<()> {
        let path = self.path_of(uri)?;
        fs::remove_file(&path).map_err(|err| not_found_or_io(err, uri))?;
        lock(&self.pending).remove(&path);
        Ok(())
    }

    fn album_content(&self) -> Result<Vec<MediaUri>> {
        let pending = lock(&self.pending).clone();
        let mut uris = Vec::new();
        for entry in WalkDir::new(&self.album_dir).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|err| Error::Io(io::Error::new(io::ErrorKind::Other, err)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let hidden = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with('.'))
                .unwrap_or(false);
            if hidden || pending.contains(entry.path()) {
                continue;
            }
            match MediaUri::try_from_path(entry.path()) {
                Some(uri) => uris.push(uri),
                None => debug!("skipping non UTF-8 album file {}", entry.path().display()),
            }
        }
        uris.sort();
        Ok(uris)
    }

    fn is_album_member(&self, uri: &MediaUri) -> bool {
        self.path_of(uri)
            .map(|path| path.starts_with(&self.album_dir))
            .unwrap_or(false)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolves `.` and `..` lexically so containment checks cannot be escaped.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn not_found_or_io(err: io::Error, uri: &MediaUri) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(uri.clone())
    } else {
        Error::Io(err)
    }
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "3gp" => "video/3gpp",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn sniffs_content_before_trusting_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path()).unwrap();
        let mislabeled = store.root().join("actually_png.jpg");
        fs::write(&mislabeled, PNG_MAGIC).unwrap();
        let by_name = store.root().join("clip.webm");
        fs::write(&by_name, b"not a real container").unwrap();

        let uri = MediaUri::from_path(&mislabeled);
        assert_eq!(store.mime_type(&uri).unwrap().as_deref(), Some("image/png"));
        let uri = MediaUri::from_path(&by_name);
        assert_eq!(store.mime_type(&uri).unwrap().as_deref(), Some("video/webm"));
    }

    #[test]
    fn pending_entries_are_hidden_until_published() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path()).unwrap();
        let entry = NewMediaEntry {
            display_name: "a_1.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            collection: crate::models::Collection::Images,
        };

        let first = store.insert(&entry).unwrap();
        let second = store.insert(&entry).unwrap();
        assert_ne!(first, second);
        assert!(store.album_content().unwrap().is_empty());

        store.set_pending(&first, false).unwrap();
        assert_eq!(store.album_content().unwrap(), vec![first.clone()]);
        assert!(store.is_album_member(&second));
    }

    #[test]
    fn concurrent_inserts_with_one_name_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path()).unwrap();
        let entry = NewMediaEntry {
            display_name: "same_1.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            collection: crate::models::Collection::Images,
        };
        let barrier = std::sync::Barrier::new(8);

        let uris: Vec<MediaUri> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        store.insert(&entry).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<&MediaUri> = uris.iter().collect();
        assert_eq!(unique.len(), 8);
        assert!(uris.contains(&MediaUri::from_path(&store.album_dir().join("same_1.jpg"))));
        assert!(uris.contains(&MediaUri::from_path(&store.album_dir().join("same_1-7.jpg"))));
    }

    #[test]
    fn writes_outside_root_need_a_grant() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path()).unwrap();
        let foreign = fs::canonicalize(outside.path()).unwrap().join("theirs.jpg");
        fs::write(&foreign, b"old").unwrap();
        let uri = MediaUri::from_path(&foreign);

        assert!(matches!(
            store.open_write(&uri),
            Err(Error::PermissionRequired(_))
        ));

        store.grant_write(&uri);
        {
            let mut out = store.open_write(&uri).unwrap();
            out.write_all(b"new").unwrap();
            out.flush().unwrap();
        }
        assert_eq!(fs::read(&foreign).unwrap(), b"new");
    }

    #[test]
    fn dot_dot_cannot_escape_the_album() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path()).unwrap();
        let sneaky = store.album_dir().join("..").join("..").join("x.jpg");
        assert!(!store.is_album_member(&MediaUri::from_path(&sneaky)));
    }

    #[test]
    fn missing_files_report_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path()).unwrap();
        let uri = MediaUri::from_path(&store.album_dir().join("nope.jpg"));
        assert!(matches!(store.open_read(&uri), Err(Error::NotFound(_))));
        assert!(matches!(store.delete(&uri), Err(Error::NotFound(_))));
    }
}
