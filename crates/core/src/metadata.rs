use log::{debug, warn};

use crate::models::{MediaInfo, MediaUri};
use crate::resolver::ContentResolver;

pub const UNKNOWN_NAME: &str = "Unknown";

pub fn resolve(resolver: &dyn ContentResolver, uri: &MediaUri) -> MediaInfo {
    let mut name = UNKNOWN_NAME.to_string();
    let mut last_modified = 0;
    match resolver.query_info(uri) {
        Ok(info) => {
            if let Some(display_name) = info.display_name {
                name = display_name;
            }
            if let Some(modified) = info.date_modified {
                last_modified = modified;
            }
        }
        Err(err) => warn!("error getting file info for {uri}: {err}"),
    }

    MediaInfo {
        name,
        last_modified,
        is_video: is_video(resolver, uri),
    }
}

/// MIME-based kind check. Unknown or failing lookups count as images.
pub fn is_video(resolver: &dyn ContentResolver, uri: &MediaUri) -> bool {
    match resolver.mime_type(uri) {
        Ok(Some(mime)) => mime.starts_with("video/"),
        Ok(None) => false,
        Err(err) => {
            debug!("mime lookup failed for {uri}, assuming image: {err}");
            false
        }
    }
}

pub fn display_name(resolver: &dyn ContentResolver, uri: &MediaUri) -> Option<String> {
    match resolver.query_info(uri) {
        Ok(info) => info.display_name,
        Err(err) => {
            warn!("could not get original name for {uri}: {err}");
            None
        }
    }
}

/// A URI is live when it can still be opened for reading.
pub fn is_readable(resolver: &dyn ContentResolver, uri: &MediaUri) -> bool {
    resolver.open_read(uri).is_ok()
}

/// `name.ext` -> `name`. Names without an extension are returned whole.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedResolver;

    #[test]
    fn resolve_reads_name_time_and_kind() {
        let resolver = ScriptedResolver::new();
        let uri = resolver.add_source("content://picker/1", "video/mp4", "clip.mp4", 42);

        let info = resolve(&resolver, &uri);
        assert_eq!(info.name, "clip.mp4");
        assert_eq!(info.last_modified, 42);
        assert!(info.is_video);
    }

    #[test]
    fn failing_lookups_fall_back_to_defaults() {
        let resolver = ScriptedResolver::new();
        let uri = resolver.add_source("content://picker/2", "video/webm", "x.webm", 7);
        resolver.fail_queries(&uri);
        resolver.fail_mime(&uri);

        let info = resolve(&resolver, &uri);
        assert_eq!(info.name, UNKNOWN_NAME);
        assert_eq!(info.last_modified, 0);
        assert!(!info.is_video);
    }

    #[test]
    fn strip_extension_keeps_dotfiles_and_plain_names() {
        assert_eq!(strip_extension("holiday.final.jpg"), "holiday.final");
        assert_eq!(strip_extension(".hidden"), ".hidden");
        assert_eq!(strip_extension("plain"), "plain");
    }
}
