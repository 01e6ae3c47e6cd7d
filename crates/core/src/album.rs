use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::error::Result;
use crate::models::{Collection, MediaUri, NewMediaEntry};
use crate::resolver::ContentResolver;

pub const ALBUM_NAME: &str = "LumaLoop";
const DEFAULT_MIME: &str = "image/jpeg";
const DEFAULT_BASE_NAME: &str = "lumaloop";

/// A failed copy removes the half-written album entry.
pub fn copy_to_album(
    resolver: &dyn ContentResolver,
    source: &MediaUri,
    base_name: Option<&str>,
) -> Result<MediaUri> {
    let mut input = resolver.open_read(source)?;

    let mime = resolver
        .mime_type(source)
        .ok()
        .flatten()
        .unwrap_or_else(|| DEFAULT_MIME.to_string());
    let is_video = mime.starts_with("video/");

    let entry = NewMediaEntry {
        display_name: album_file_name(base_name, now_millis(), extension_for_mime(&mime)),
        mime_type: mime,
        collection: if is_video {
            Collection::Videos
        } else {
            Collection::Images
        },
    };

    let target = resolver.insert(&entry)?;
    let copied = resolver.open_write(&target).and_then(|mut output| {
        io::copy(&mut input, &mut output)?;
        output.flush()?;
        Ok(())
    });
    if let Err(err) = copied {
        if let Err(cleanup) = resolver.delete(&target) {
            warn!("failed to remove partial album entry {target}: {cleanup}");
        }
        return Err(err);
    }

    resolver.set_pending(&target, false)?;
    debug!("copied {source} to album as {target}");
    Ok(target)
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let is_video = mime.starts_with("video/");
    if mime.contains("mp4") {
        ".mp4"
    } else if mime.contains("3gp") {
        ".3gp"
    } else if mime.contains("webm") {
        ".webm"
    } else if mime.contains("png") {
        ".png"
    } else if mime.contains("webp") {
        ".webp"
    } else if mime.contains("jpeg") || mime.contains("jpg") {
        ".jpg"
    } else if is_video {
        ".mp4"
    } else {
        ".jpg"
    }
}

pub fn album_file_name(base_name: Option<&str>, millis: u128, extension: &str) -> String {
    let base = base_name
        .map(sanitize_base_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string());
    format!("{base}_{millis}{extension}")
}

fn sanitize_base_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedResolver;

    #[test]
    fn extension_follows_mime_with_kind_fallback() {
        assert_eq!(extension_for_mime("video/mp4"), ".mp4");
        assert_eq!(extension_for_mime("video/3gpp"), ".3gp");
        assert_eq!(extension_for_mime("video/webm"), ".webm");
        assert_eq!(extension_for_mime("video/quicktime"), ".mp4");
        assert_eq!(extension_for_mime("image/png"), ".png");
        assert_eq!(extension_for_mime("image/webp"), ".webp");
        assert_eq!(extension_for_mime("image/jpeg"), ".jpg");
        assert_eq!(extension_for_mime("image/heic"), ".jpg");
    }

    #[test]
    fn file_name_uses_base_or_default() {
        assert_eq!(album_file_name(Some("beach"), 17, ".png"), "beach_17.png");
        assert_eq!(album_file_name(Some("a/b"), 1, ".jpg"), "a_b_1.jpg");
        assert_eq!(album_file_name(Some("  "), 5, ".mp4"), "lumaloop_5.mp4");
        assert_eq!(album_file_name(None, 5, ".jpg"), "lumaloop_5.jpg");
    }

    #[test]
    fn copy_publishes_entry_with_source_bytes() {
        let resolver = ScriptedResolver::new();
        let source = resolver.add_source("content://picker/7", "image/png", "sunset.png", 1);
        resolver.set_data(&source, b"pixels");

        let target = copy_to_album(&resolver, &source, Some("sunset")).unwrap();

        assert!(resolver.is_album_member(&target));
        assert_eq!(resolver.data(&target).unwrap(), b"pixels");
        assert_eq!(resolver.is_pending(&target), Some(false));
        let name = resolver.name(&target).unwrap();
        assert!(name.starts_with("sunset_") && name.ends_with(".png"), "{name}");
    }

    #[test]
    fn failed_write_removes_partial_entry() {
        let resolver = ScriptedResolver::new();
        let source = resolver.add_source("content://picker/8", "video/mp4", "v.mp4", 1);
        // Protecting the next album id makes the write step fail after insert.
        resolver.protect(&MediaUri::new("content://media/album/0"));

        let err = copy_to_album(&resolver, &source, None).unwrap_err();
        assert!(matches!(err, crate::Error::PermissionRequired(_)));
        assert_eq!(resolver.deleted(), vec![MediaUri::new("content://media/album/0")]);
        assert!(resolver.album_content().unwrap().is_empty());
    }
}
