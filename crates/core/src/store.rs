use crate::error::Result;
use crate::models::MediaUri;

pub trait UriStore {
    /// Every stored URI in selection order. Fails soft: an unreadable backing
    /// store yields an empty list.
    fn all(&self) -> Vec<MediaUri>;

    fn add(&mut self, uri: &MediaUri) -> Result<()>;

    /// Removes every occurrence of `uri`; a no-op when absent.
    fn remove(&mut self, uri: &MediaUri) -> Result<()>;

    fn record_origin(&mut self, _source: &MediaUri, _stored: &MediaUri) -> Result<()> {
        Ok(())
    }

    /// The URI previously imported from `source`, if known.
    fn stored_for(&self, _source: &MediaUri) -> Option<MediaUri> {
        None
    }
}
