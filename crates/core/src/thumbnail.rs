use std::io::{Cursor, Read};

use log::debug;

use crate::error::Result;
use crate::models::MediaItem;
use crate::resolver::ContentResolver;
use crate::video::{FrameExtractor, PREVIEW_FRAME_AT};

/// Renders a PNG thumbnail no larger than `max_dim` on either side.
///
/// Videos go through `extractor`; images are decoded directly. Any failure
/// yields `None` so callers can show a placeholder instead.
pub fn render_thumbnail(
    resolver: &dyn ContentResolver,
    extractor: &dyn FrameExtractor,
    item: &MediaItem,
    max_dim: u32,
) -> Option<Vec<u8>> {
    let encoded = if item.is_video {
        extractor.frame_near(&item.uri, PREVIEW_FRAME_AT)
    } else {
        read_all(resolver, item).ok()
    }?;

    match scale_to_png(&encoded, max_dim) {
        Ok(png) => Some(png),
        Err(err) => {
            debug!("thumbnail for {} failed: {err}", item.uri);
            None
        }
    }
}

fn read_all(resolver: &dyn ContentResolver, item: &MediaItem) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    resolver.open_read(&item.uri)?.read_to_end(&mut bytes)?;
    Ok(bytes)
}

pub fn scale_to_png(encoded: &[u8], max_dim: u32) -> Result<Vec<u8>> {
    let img = image::load_from_memory(encoded)?;
    let thumb = img.thumbnail(max_dim.max(1), max_dim.max(1));
    let mut out = Cursor::new(Vec::new());
    thumb.write_to(&mut out, image::ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}
