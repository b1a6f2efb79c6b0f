//! Frame sources.
//!
//! This module provides the sources the detection loop pulls frames from:
//! - Local image sequences (printf-style pattern or a directory)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic scripted scenes (`stub://`, tests and demos)
//!
//! Sources are pull-based and order-preserving. `Ok(None)` from
//! `next_frame` means the stream is exhausted; any `Err` is fatal for the run.
//! Sources never block inside the detection core: the only waiting happens
//! inside `next_frame` itself.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod normalize;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::config::SourceSettings;
use crate::frame::Frame;

pub use file::{FileConfig, FileKind, FileSource};
pub(crate) use normalize::{decoded_to_frame, rgb24_frame};
pub use synthetic::{Scene, Square, SyntheticSource};

/// Pull-based frame source.
pub trait FrameSource {
    /// Open the underlying stream. Called once before the first frame.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame in stream order, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub origin: String,
}

/// Build the source named by the settings: video first, then image sequence.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = settings.video_path.as_deref() {
        log::info!("Reading video file {}", path);
        return Ok(Box::new(FileSource::new(FileConfig {
            path: path.to_string(),
            kind: FileKind::Video,
        })?));
    }
    if let Some(path) = settings.image_path.as_deref() {
        log::info!("Reading images from {}", path);
        return Ok(Box::new(FileSource::new(FileConfig {
            path: path.to_string(),
            kind: FileKind::ImageSequence,
        })?));
    }
    Err(anyhow!(
        "no frame source configured: set video_path or image_path (live camera capture is not supported)"
    ))
}
