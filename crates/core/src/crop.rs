use std::io::{self, Write};

use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::MediaUri;
use crate::resolver::ContentResolver;

/// External cropping tool. `Ok(None)` means the user cancelled.
pub trait CropTool {
    fn crop(&self, source: &MediaUri) -> Result<Option<MediaUri>>;
}

pub trait PermissionBroker {
    /// Returns whether consent was granted. Implementations record the grant
    /// with the resolver before returning `true`.
    fn request_write_consent(&self, uri: &MediaUri) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    Cancelled,
    Replaced,
    Abandoned,
}

pub fn overwrite(resolver: &dyn ContentResolver, source: &MediaUri, target: &MediaUri) -> Result<()> {
    let mut input = resolver.open_read(source)?;
    let mut output = resolver.open_write(target)?;
    io::copy(&mut input, &mut output)?;
    output.flush()?;
    Ok(())
}

/// Retries exactly once after `broker` grants consent. `cropped` is removed
/// in every case.
pub fn apply_crop(
    resolver: &dyn ContentResolver,
    broker: &dyn PermissionBroker,
    cropped: &MediaUri,
    target: &MediaUri,
) -> CropOutcome {
    let outcome = match overwrite(resolver, cropped, target) {
        Ok(()) => CropOutcome::Replaced,
        Err(Error::PermissionRequired(uri)) => {
            info!("write to {uri} needs consent, asking");
            if broker.request_write_consent(&uri) {
                match overwrite(resolver, cropped, target) {
                    Ok(()) => CropOutcome::Replaced,
                    Err(err) => {
                        error!("failed to overwrite {target} after permission grant: {err}");
                        CropOutcome::Abandoned
                    }
                }
            } else {
                info!("consent for {uri} declined, keeping original");
                CropOutcome::Abandoned
            }
        }
        Err(err) => {
            error!("error in crop flow for {target}: {err}");
            CropOutcome::Abandoned
        }
    };

    if let Err(err) = resolver.delete(cropped) {
        debug!("could not remove crop output {cropped}: {err}");
    }

    if outcome == CropOutcome::Replaced {
        republish(resolver, target);
    }
    outcome
}

fn republish(resolver: &dyn ContentResolver, target: &MediaUri) {
    let result = resolver
        .set_pending(target, true)
        .and_then(|()| resolver.set_pending(target, false));
    if let Err(err) = result {
        warn!("failed to update metadata for {target}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::testing::ScriptedResolver;

    struct Broker<'a> {
        resolver: &'a ScriptedResolver,
        grant: bool,
        asked: Cell<usize>,
    }

    impl PermissionBroker for Broker<'_> {
        fn request_write_consent(&self, uri: &MediaUri) -> bool {
            self.asked.set(self.asked.get() + 1);
            if self.grant {
                self.resolver.grant(uri);
            }
            self.grant
        }
    }

    fn fixture() -> (ScriptedResolver, MediaUri, MediaUri) {
        let resolver = ScriptedResolver::new();
        let target = resolver.add_album_entry("image/jpeg", "photo.jpg", 1);
        resolver.set_data(&target, b"original");
        let cropped = resolver.add_source("file:///cache/crop_temp_1.jpg", "image/jpeg", "crop.jpg", 2);
        resolver.set_data(&cropped, b"cropped");
        (resolver, target, cropped)
    }

    #[test]
    fn owned_target_is_replaced_and_temp_removed() {
        let (resolver, target, cropped) = fixture();
        let broker = Broker { resolver: &resolver, grant: false, asked: Cell::new(0) };

        assert_eq!(apply_crop(&resolver, &broker, &cropped, &target), CropOutcome::Replaced);
        assert_eq!(resolver.data(&target).unwrap(), b"cropped");
        assert_eq!(resolver.is_pending(&target), Some(false));
        assert!(resolver.data(&cropped).is_none());
        assert_eq!(broker.asked.get(), 0);
    }

    #[test]
    fn permission_is_requested_once_then_retried() {
        let (resolver, target, cropped) = fixture();
        resolver.protect(&target);
        let broker = Broker { resolver: &resolver, grant: true, asked: Cell::new(0) };

        assert_eq!(apply_crop(&resolver, &broker, &cropped, &target), CropOutcome::Replaced);
        assert_eq!(broker.asked.get(), 1);
        assert_eq!(resolver.data(&target).unwrap(), b"cropped");
    }

    #[test]
    fn declined_consent_abandons_and_keeps_original() {
        let (resolver, target, cropped) = fixture();
        resolver.protect(&target);
        let broker = Broker { resolver: &resolver, grant: false, asked: Cell::new(0) };

        assert_eq!(apply_crop(&resolver, &broker, &cropped, &target), CropOutcome::Abandoned);
        assert_eq!(resolver.data(&target).unwrap(), b"original");
        assert!(resolver.data(&cropped).is_none());
    }
}
