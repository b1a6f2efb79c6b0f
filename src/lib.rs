//! Motion Kernel
//!
//! This crate implements frame-differencing motion detection over video
//! files and image sequences.
//!
//! # Architecture
//!
//! Every frame pulled from a source goes through the same stages:
//!
//! 1. **Preprocess**: resize to a target width, convert to grayscale, Gaussian blur.
//! 2. **Background**: the first frame in the detection window seeds a background
//!    model (a fixed first frame, or a running weighted average).
//! 3. **Delta**: absolute difference between the frame and the background.
//! 4. **Extract**: threshold, dilate, find external contours, drop small ones.
//! 5. **Report**: one `FrameResult` per frame inside the window, handed to a sink.
//!    Its annotated image carries region boxes and a `Frame # N` overlay.
//!
//! Image operations run on OpenCV (`opencv` crate, `imgproc`).
//!
//! The detection core never blocks and never touches the filesystem; sources
//! and sinks do.
//!
//! # Module Structure
//!
//! - `frame`: owned pixel buffers (`Frame`, `PixelFormat`)
//! - `detect`: preprocessing, background model, region extraction, annotation
//! - `pipeline`: detection window and the frame-indexed detection loop
//! - `ingest`: frame sources (image sequences, video files, synthetic scenes)
//! - `storage`: image persistence sink
//! - `config`: JSON configuration with environment overrides

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod storage;

pub use config::{MotiondConfig, OutputSettings, SourceSettings};
pub use detect::{BackgroundModel, BackgroundStrategy, FrameResult, KernelSize, Region};
pub use error::{ConfigError, ContractViolation};
pub use frame::{Frame, PixelFormat};
pub use ingest::{open_source, FileConfig, FileSource, FrameSource, SourceStats, SyntheticSource};
pub use pipeline::{
    Cancellation, DetectionLoop, DetectionWindow, DetectorConfig, NeverCancel, NullSink,
    ResultSink, RunSummary, Termination,
};
pub use storage::{ImageFormat, ImageSink};
