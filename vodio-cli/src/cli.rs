use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vodio_playback::QualityMode;

#[derive(Debug, Parser)]
#[command(
    name = "vodio",
    version,
    about = "Client for the vodio video platform: upload, transcode, watch"
)]
pub struct Args {
    /// Backend base URL. Falls back to $VODIO_API_BASE_URL.
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List uploaded videos.
    List {
        #[arg(long, default_value_t = 24)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show one video's details.
    Show { id: String },

    /// Upload a video with its thumbnail and start transcoding.
    Upload {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Video file to upload.
        #[arg(long)]
        video: PathBuf,

        /// Thumbnail image to upload.
        #[arg(long)]
        thumbnail: PathBuf,

        /// Transcoding pipeline to run.
        #[arg(long, default_value = "hls")]
        pipeline: String,

        /// Do not enter the watch view after the upload finishes.
        #[arg(long)]
        no_watch: bool,
    },

    /// Follow transcoding progress and stream the result once ready.
    Watch {
        id: String,

        /// `auto` or a rendition height like `720p`.
        #[arg(long, default_value = "auto")]
        quality: QualityMode,

        /// Write received segment bytes to this file (default: discard).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up when the job makes no progress for this many seconds;
        /// 0 polls forever.
        #[arg(long, default_value_t = 900)]
        stall_timeout: u64,
    },
}
