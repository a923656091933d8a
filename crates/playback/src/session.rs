//! The seam between the player engine and the underlying adaptive-bitrate
//! decoding engine.

use async_trait::async_trait;
use url::Url;

use crate::error::PlaybackError;
use crate::quality::Level;

/// Construction options for a decoding session.
///
/// This system targets video-on-demand: demuxing runs on a background worker
/// and low-latency live tuning stays off.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub background_worker: bool,
    pub low_latency: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            background_worker: true,
            low_latency: false,
        }
    }
}

/// One adaptive-bitrate decoding session bound to one output surface.
///
/// Fatal errors surface out-of-band (the session's event stream); the methods
/// here are the recovery and control operations the engine invokes on them.
#[async_trait]
pub trait AbrSession: Send {
    /// Load a manifest and begin fetching. Called once per session.
    async fn load(&mut self, manifest: &Url) -> Result<(), PlaybackError>;

    /// Restart loading after a network-class fatal error. The session keeps
    /// its identity and position.
    async fn start_load(&mut self) -> Result<(), PlaybackError>;

    /// Run the media-error recovery path after a decode-class fatal error.
    async fn recover_media_error(&mut self) -> Result<(), PlaybackError>;

    /// Return to engine-driven adaptive bitrate selection.
    fn set_auto_level(&mut self);

    /// Pin a specific level by index into [`levels`](Self::levels).
    fn set_level(&mut self, index: usize);

    /// Levels advertised by the loaded manifest; empty before `load`.
    fn levels(&self) -> Vec<Level>;

    /// Tear the session down and release its resources. Idempotent.
    async fn destroy(&mut self);
}

/// Builds decoding sessions for one output surface.
pub trait SessionFactory: Send {
    /// Whether the surface decodes the manifest format natively, making an
    /// internal decoding session unnecessary.
    fn native_playback(&self) -> bool {
        false
    }

    /// Hand the manifest straight to the natively-capable surface.
    fn attach_native(&mut self, _manifest: &Url) -> Result<(), PlaybackError> {
        Err(PlaybackError::internal(
            "surface does not support native playback",
        ))
    }

    /// Whether an engine-driven session can run on this surface at all.
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&mut self, options: &SessionOptions) -> Result<Box<dyn AbrSession>, PlaybackError>;
}
