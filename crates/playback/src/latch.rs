use tracing::{info, warn};
use url::Url;
use vodio_api::PlaybackStatus;

/// One-shot holder for the playback manifest URL.
///
/// The player must attach to a manifest exactly once per watch session; if the
/// latched value tracked every poll result, a wobbling backend response would
/// force a destructive reinitialization of live playback. The latch accepts a
/// single write and ignores everything after it.
#[derive(Debug, Clone, Default)]
pub enum ManifestLatch {
    #[default]
    Unset,
    Set(Url),
}

impl ManifestLatch {
    pub fn new() -> Self {
        Self::Unset
    }

    /// Feed one status snapshot through the latch.
    ///
    /// Transitions `Unset -> Set` the first time a snapshot is ready and
    /// carries a parseable, non-empty manifest URL; returns the URL on exactly
    /// that transition. A malformed URL does not consume the latch.
    pub fn observe(&mut self, status: &PlaybackStatus) -> Option<Url> {
        if self.is_set() {
            return None;
        }
        if !status.playback_ready {
            return None;
        }
        let raw = status.manifest_url()?;
        match Url::parse(raw) {
            Ok(url) => {
                info!(video_id = %status.video_id, manifest = %url, "manifest latched");
                *self = Self::Set(url.clone());
                Some(url)
            }
            Err(e) => {
                warn!(video_id = %status.video_id, url = raw, error = %e, "ready status carried unparseable manifest URL");
                None
            }
        }
    }

    pub fn get(&self) -> Option<&Url> {
        match self {
            Self::Unset => None,
            Self::Set(url) => Some(url),
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }
}
