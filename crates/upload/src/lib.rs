//! Upload orchestrator: the strictly ordered flow from presigned credentials
//! through storage transfers to the transcoding job start.
//!
//! Phases run `idle -> presigning -> uploading -> starting -> done`; a failure
//! at any step resets the whole flow to idle at 0%; there is no
//! partial-progress resume. Progress is published as a monotonically
//! non-decreasing percentage over a watch channel.

mod error;
mod orchestrator;
mod source;

pub use error::UploadError;
pub use orchestrator::{
    UploadBackend, UploadOrchestrator, UploadPhase, UploadProgress, UploadRequest,
};
pub use source::{FileKind, FileSource};
