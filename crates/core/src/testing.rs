use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{ContentInfo, MediaUri, NewMediaEntry};
use crate::resolver::ContentResolver;

const ALBUM_PREFIX: &str = "content://media/album/";

#[derive(Debug, Clone)]
struct Entry {
    mime: String,
    name: String,
    modified: i64,
    data: Vec<u8>,
    pending: bool,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<MediaUri, Entry>>,
    unreadable: Mutex<HashSet<MediaUri>>,
    failing_queries: Mutex<HashSet<MediaUri>>,
    failing_mime: Mutex<HashSet<MediaUri>>,
    protected: Mutex<HashSet<MediaUri>>,
    fail_inserts: Mutex<bool>,
    fail_album_listing: Mutex<bool>,
    deleted: Mutex<Vec<MediaUri>>,
    read_delay: Mutex<Duration>,
    read_threads: Mutex<Vec<ThreadId>>,
    next_id: AtomicUsize,
    active_reads: AtomicUsize,
    max_active_reads: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct ScriptedResolver {
    inner: Arc<Inner>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, uri: &str, mime: &str, name: &str, modified: i64) -> MediaUri {
        let uri = MediaUri::new(uri);
        self.inner.entries.lock().unwrap().insert(
            uri.clone(),
            Entry {
                mime: mime.to_string(),
                name: name.to_string(),
                modified,
                data: name.as_bytes().to_vec(),
                pending: false,
            },
        );
        uri
    }

    /// Places a published entry straight into the album, as if another app
    /// had copied it there.
    pub fn add_album_entry(&self, mime: &str, name: &str, modified: i64) -> MediaUri {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let uri = format!("{ALBUM_PREFIX}{id}");
        self.add_source(&uri, mime, name, modified)
    }

    pub fn remove_entry(&self, uri: &MediaUri) {
        self.inner.entries.lock().unwrap().remove(uri);
    }

    pub fn set_data(&self, uri: &MediaUri, data: &[u8]) {
        if let Some(entry) = self.inner.entries.lock().unwrap().get_mut(uri) {
            entry.data = data.to_vec();
        }
    }

    pub fn data(&self, uri: &MediaUri) -> Option<Vec<u8>> {
        self.inner.entries.lock().unwrap().get(uri).map(|e| e.data.clone())
    }

    pub fn name(&self, uri: &MediaUri) -> Option<String> {
        self.inner.entries.lock().unwrap().get(uri).map(|e| e.name.clone())
    }

    pub fn is_pending(&self, uri: &MediaUri) -> Option<bool> {
        self.inner.entries.lock().unwrap().get(uri).map(|e| e.pending)
    }

    pub fn fail_reads(&self, uri: &MediaUri) {
        self.inner.unreadable.lock().unwrap().insert(uri.clone());
    }

    pub fn fail_queries(&self, uri: &MediaUri) {
        self.inner.failing_queries.lock().unwrap().insert(uri.clone());
    }

    pub fn fail_mime(&self, uri: &MediaUri) {
        self.inner.failing_mime.lock().unwrap().insert(uri.clone());
    }

    pub fn protect(&self, uri: &MediaUri) {
        self.inner.protected.lock().unwrap().insert(uri.clone());
    }

    pub fn grant(&self, uri: &MediaUri) {
        self.inner.protected.lock().unwrap().remove(uri);
    }

    pub fn fail_inserts(&self, fail: bool) {
        *self.inner.fail_inserts.lock().unwrap() = fail;
    }

    pub fn fail_album_listing(&self, fail: bool) {
        *self.inner.fail_album_listing.lock().unwrap() = fail;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.inner.read_delay.lock().unwrap() = delay;
    }

    pub fn max_active_reads(&self) -> usize {
        self.inner.max_active_reads.load(Ordering::SeqCst)
    }

    /// Threads every `open_read` call ran on, in call order.
    pub fn read_threads(&self) -> Vec<ThreadId> {
        self.inner.read_threads.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MediaUri> {
        self.inner.deleted.lock().unwrap().clone()
    }

    fn entry(&self, uri: &MediaUri) -> Result<Entry> {
        self.inner
            .entries
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::NotFound(uri.clone()))
    }
}

struct TrackedReader {
    inner: Arc<Inner>,
    data: Cursor<Vec<u8>>,
}

impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.inner.active_reads.fetch_sub(1, Ordering::SeqCst);
    }
}

struct EntryWriter {
    inner: Arc<Inner>,
    uri: MediaUri,
    buf: Vec<u8>,
}

impl Write for EntryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EntryWriter {
    fn drop(&mut self) {
        if let Some(entry) = self.inner.entries.lock().unwrap().get_mut(&self.uri) {
            entry.data = std::mem::take(&mut self.buf);
        }
    }
}

impl ContentResolver for ScriptedResolver {
    fn open_read(&self, uri: &MediaUri) -> Result<Box<dyn Read + Send>> {
        if self.inner.unreadable.lock().unwrap().contains(uri) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "unreadable",
            )));
        }
        self.inner.read_threads.lock().unwrap().push(thread::current().id());
        let entry = self.entry(uri)?;

        let active = self.inner.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_active_reads.fetch_max(active, Ordering::SeqCst);
        let delay = *self.inner.read_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        Ok(Box::new(TrackedReader {
            inner: self.inner.clone(),
            data: Cursor::new(entry.data),
        }))
    }

    fn open_write(&self, uri: &MediaUri) -> Result<Box<dyn Write + Send>> {
        if self.inner.protected.lock().unwrap().contains(uri) {
            return Err(Error::PermissionRequired(uri.clone()));
        }
        self.entry(uri)?;
        Ok(Box::new(EntryWriter {
            inner: self.inner.clone(),
            uri: uri.clone(),
            buf: Vec::new(),
        }))
    }

    fn mime_type(&self, uri: &MediaUri) -> Result<Option<String>> {
        if self.inner.failing_mime.lock().unwrap().contains(uri) {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "mime lookup")));
        }
        Ok(self.entry(uri).ok().map(|e| e.mime))
    }

    fn query_info(&self, uri: &MediaUri) -> Result<ContentInfo> {
        if self.inner.failing_queries.lock().unwrap().contains(uri) {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "query")));
        }
        let entry = self.entry(uri)?;
        Ok(ContentInfo {
            display_name: Some(entry.name),
            date_modified: Some(entry.modified),
        })
    }

    fn insert(&self, entry: &NewMediaEntry) -> Result<MediaUri> {
        if *self.inner.fail_inserts.lock().unwrap() {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "volume full")));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let uri = MediaUri::new(format!("{ALBUM_PREFIX}{id}"));
        self.inner.entries.lock().unwrap().insert(
            uri.clone(),
            Entry {
                mime: entry.mime_type.clone(),
                name: entry.display_name.clone(),
                modified: 1_700_000_000 + id as i64,
                data: Vec::new(),
                pending: true,
            },
        );
        Ok(uri)
    }

    fn set_pending(&self, uri: &MediaUri, pending: bool) -> Result<()> {
        let mut entries = self.inner.entries.lock().unwrap();
        let entry = entries
            .get_mut(uri)
            .ok_or_else(|| Error::NotFound(uri.clone()))?;
        entry.pending = pending;
        Ok(())
    }

    fn delete(&self, uri: &MediaUri) -> Result<()> {
        self.inner.deleted.lock().unwrap().push(uri.clone());
        self.inner
            .entries
            .lock()
            .unwrap()
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(uri.clone()))
    }

    fn album_content(&self) -> Result<Vec<MediaUri>> {
        if *self.inner.fail_album_listing.lock().unwrap() {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "index busy")));
        }
        let entries = self.inner.entries.lock().unwrap();
        let mut uris: Vec<MediaUri> = entries
            .iter()
            .filter(|(uri, entry)| self.is_album_member(uri) && !entry.pending)
            .map(|(uri, _)| uri.clone())
            .collect();
        uris.sort();
        Ok(uris)
    }

    fn is_album_member(&self, uri: &MediaUri) -> bool {
        uri.as_str().starts_with(ALBUM_PREFIX)
    }
}
