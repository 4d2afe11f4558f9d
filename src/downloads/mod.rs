//! Local video downloads: manifest, ffmpeg transcoder and the manager tying
//! them together.
//!
//! The manifest lives at `<data>/downloads/manifest.json` and holds every
//! download newest first. Progress, completion and failure are broadcast as
//! [`DownloadEvent`]s for the host to forward to the page.

mod manager;
mod manifest;
mod transcoder;

pub use manager::{
    DownloadEvent, DownloadManager, DownloadRequest, MAX_SUBTITLE_BYTES, MAX_TITLE_LENGTH,
    PAGE_ERROR_MESSAGE, output_file_name,
};
pub use manifest::{DownloadEntry, DownloadStatus, MANIFEST_FILE, Manifest};
pub use transcoder::{
    FFMPEG_USER_AGENT, FfmpegTranscoder, TranscodeJob, TranscodeProgressFn, Transcoder,
    parse_progress_line,
};

#[cfg(test)]
pub use transcoder::MockTranscoder;
