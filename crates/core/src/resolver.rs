use std::io::{Read, Write};

use crate::error::Result;
use crate::models::{ContentInfo, MediaUri, NewMediaEntry};

pub trait ContentResolver: Send + Sync {
    fn open_read(&self, uri: &MediaUri) -> Result<Box<dyn Read + Send>>;

    /// Opens `uri` for overwriting. Returns [`crate::Error::PermissionRequired`]
    /// when the app does not own the target and no consent was granted.
    fn open_write(&self, uri: &MediaUri) -> Result<Box<dyn Write + Send>>;

    fn mime_type(&self, uri: &MediaUri) -> Result<Option<String>>;

    fn query_info(&self, uri: &MediaUri) -> Result<ContentInfo>;

    fn insert(&self, entry: &NewMediaEntry) -> Result<MediaUri>;

    /// Pending entries are hidden from album listings until published.
    fn set_pending(&self, uri: &MediaUri, pending: bool) -> Result<()>;

    fn delete(&self, uri: &MediaUri) -> Result<()>;

    /// Every published entry currently in the shared album.
    fn album_content(&self) -> Result<Vec<MediaUri>>;

    /// Whether `uri` refers to an entry of the shared album, present or not.
    fn is_album_member(&self, uri: &MediaUri) -> bool;
}
