//! Playback readiness state machine and adaptive streaming player engine.
//!
//! The pieces compose in one direction: a [`StatusPoller`] watches the
//! backend's playback endpoint on an interval that widens once the job is
//! ready; a [`ManifestLatch`] captures the first ready manifest URL and never
//! lets go of it; a [`PlayerEngine`] attaches an adaptive-bitrate decoding
//! session to that manifest exactly once, switches quality on request and
//! recovers from fatal errors in place where the error class allows it. The
//! [`WatchSession`] owns one of each and is the unit of lifecycle: dropping it
//! stops the poller and destroys the session.
//!
//! The decoding session itself sits behind the [`AbrSession`] seam;
//! [`HlsAbrSession`] is the built-in implementation that streams HLS segments
//! from storage with retry-and-backoff.

mod engine;
mod error;
mod hls;
mod latch;
mod poller;
mod quality;
mod retry;
mod session;
mod watch;

pub use engine::{EngineState, PlayerEngine};
pub use error::{FatalErrorKind, PlaybackError};
pub use hls::{HlsAbrSession, HlsSessionFactory, SessionEvent};
pub use latch::ManifestLatch;
pub use poller::{PollerConfig, PollerHandle, PollerSnapshot, StatusPoller, StatusSource};
pub use quality::{Level, QualityMode, select_level};
pub use retry::{BackoffPolicy, RetryOutcome, retry_with_backoff};
pub use session::{AbrSession, SessionFactory, SessionOptions};
pub use watch::{WatchConfig, WatchSession};
