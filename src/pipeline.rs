//! Frame-indexed detection loop.
//!
//! Frames are numbered from 2: frame 1 is, by convention, the background.
//! Every frame pulled from the source advances the frame number, whether
//! or not it falls inside the detection window. The first frame inside the
//! window seeds the background model and produces no result; every later
//! frame inside the window produces exactly one `FrameResult`.
//!
//! Processing is strictly sequential. Cancellation is polled between
//! frames, so a result is either fully emitted or not emitted at all.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::Serialize;

use crate::detect::{
    annotate, extract, preprocess, BackgroundModel, BackgroundStrategy, DegradedCondition,
    FrameResult, KernelSize, Overlay,
};
use crate::error::ConfigError;
use crate::frame::Frame;
use crate::ingest::FrameSource;

/// Number given to the first frame read from a source.
pub const FIRST_FRAME_NUMBER: u64 = 2;

/// Inclusive, 1-based range of frame numbers eligible for detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DetectionWindow {
    start: u64,
    end: Option<u64>,
}

impl DetectionWindow {
    pub fn new(start: u64, end: Option<u64>) -> Result<Self, ConfigError> {
        if start == 0 {
            return Err(ConfigError::StartFrameTooSmall(start));
        }
        if let Some(end) = end {
            if end < start {
                return Err(ConfigError::InvalidWindow { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn unbounded() -> Self {
        Self {
            start: 1,
            end: None,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    pub fn contains(&self, frame_number: u64) -> bool {
        frame_number >= self.start && !self.is_past(frame_number)
    }

    pub fn is_past(&self, frame_number: u64) -> bool {
        self.end.is_some_and(|end| frame_number > end)
    }
}

/// Validated settings for the detection core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetectorConfig {
    /// Target width for resizing; 0 disables resizing.
    pub resize_width: u32,
    pub kernel_size: KernelSize,
    pub delta_threshold: u8,
    pub min_area: u64,
    pub background_model: BackgroundStrategy,
    pub window: DetectionWindow,
    /// Write the local date and time on annotated images.
    pub show_datetime: bool,
}

impl DetectorConfig {
    /// Accept thresholds in `[0, 255)`.
    pub fn threshold(value: i64) -> Result<u8, ConfigError> {
        if !(0..255).contains(&value) {
            return Err(ConfigError::ThresholdOutOfRange(value));
        }
        Ok(value as u8)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            resize_width: 500,
            kernel_size: KernelSize::default(),
            delta_threshold: 25,
            min_area: 500,
            background_model: BackgroundStrategy::FirstFrame,
            window: DetectionWindow::unbounded(),
            show_datetime: false,
        }
    }
}

/// Receives the loop's output.
pub trait ResultSink {
    /// Called once, with the resized color frame that seeded the background.
    fn background_initialized(&mut self, _frame_number: u64, _frame: &Frame) -> Result<()> {
        Ok(())
    }

    fn frame_result(&mut self, result: FrameResult) -> Result<()>;
}

impl ResultSink for Vec<FrameResult> {
    fn frame_result(&mut self, result: FrameResult) -> Result<()> {
        self.push(result);
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn background_initialized(&mut self, frame_number: u64, frame: &Frame) -> Result<()> {
        (**self).background_initialized(frame_number, frame)
    }

    fn frame_result(&mut self, result: FrameResult) -> Result<()> {
        (**self).frame_result(result)
    }
}

/// Sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn frame_result(&mut self, _result: FrameResult) -> Result<()> {
        Ok(())
    }
}

/// Stop request polled between frames.
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// Cancellation that never fires.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Termination {
    EndOfStream,
    PastEndFrame,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames_read: u64,
    pub results_emitted: u64,
    pub occupied_frames: u64,
    pub background_frame: Option<u64>,
    /// `frame_number - 1` at exit.
    pub frames_processed: u64,
    pub termination: Termination,
}

/// What happened to one frame handed to [`DetectionLoop::step`].
#[derive(Clone, Debug)]
pub enum Step {
    /// Outside the detection window.
    Skipped,
    /// Seeded the background model. Carries the resized color frame.
    BackgroundInitialized(Frame),
    Result(FrameResult),
}

/// Per-run detection state: frame counter and background model.
pub struct DetectionLoop {
    config: DetectorConfig,
    model: BackgroundModel,
    frame_number: u64,
}

impl DetectionLoop {
    pub fn new(config: DetectorConfig) -> Self {
        let model = BackgroundModel::new(config.background_model);
        Self {
            config,
            model,
            frame_number: FIRST_FRAME_NUMBER,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Number the next pulled frame will get.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.model
    }

    /// Process one frame pulled from the source and advance the frame number.
    ///
    /// On error the frame number is left unchanged and nothing is emitted.
    pub fn step(&mut self, frame: &Frame) -> Result<Step> {
        let frame_number = self.frame_number;
        let step = if self.config.window.contains(frame_number) {
            self.process(frame_number, frame)?
        } else {
            log::debug!("Skipping frame number {}", frame_number);
            Step::Skipped
        };
        self.frame_number += 1;
        Ok(step)
    }

    fn process(&mut self, frame_number: u64, frame: &Frame) -> Result<Step> {
        let pre = preprocess(frame, self.config.resize_width, self.config.kernel_size)?;
        if let Some(DegradedCondition::Upscaled {
            source_width,
            target_width,
        }) = pre.degraded
        {
            log::debug!(
                "Image is being resized to a width ({}) that is greater than its actual width ({})",
                target_width,
                source_width
            );
        }

        if !self.model.is_initialized() {
            self.model.initialize(&pre.gray)?;
            return Ok(Step::BackgroundInitialized(pre.color));
        }

        let delta = self.model.compute_delta(&pre.gray)?;
        let extraction = extract(&delta, self.config.delta_threshold, self.config.min_area)?;
        let overlay = Overlay {
            frame_number,
            timestamp: self.config.show_datetime.then(chrono::Local::now),
        };
        let annotated = annotate(&pre.color, &extraction.regions, &overlay)?;
        Ok(Step::Result(FrameResult {
            frame_number,
            occupied: extraction.occupied,
            regions: extraction.regions,
            delta_image: delta,
            threshold_image: extraction.binary,
            annotated_image: annotated,
        }))
    }

    /// Drive the loop until end of stream, the end of the window, or cancellation.
    pub fn run<S, K, C>(&mut self, source: &mut S, sink: &mut K, cancel: &C) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        K: ResultSink + ?Sized,
        C: Cancellation + ?Sized,
    {
        let mut frames_read = 0u64;
        let mut results_emitted = 0u64;
        let mut occupied_frames = 0u64;
        let mut background_frame = None;

        let termination = loop {
            if cancel.is_cancelled() {
                log::debug!("Cancellation requested. Stopping at frame # {}", self.frame_number);
                break Termination::Cancelled;
            }
            if self.config.window.is_past(self.frame_number) {
                log::debug!("Reached end of frames: frame # {}", self.frame_number);
                break Termination::PastEndFrame;
            }
            let Some(frame) = source.next_frame()? else {
                break Termination::EndOfStream;
            };
            frames_read += 1;

            let frame_number = self.frame_number;
            match self.step(&frame)? {
                Step::Skipped => {}
                Step::BackgroundInitialized(color) => {
                    background_frame = Some(frame_number);
                    sink.background_initialized(frame_number, &color)?;
                }
                Step::Result(result) => {
                    log::debug!(
                        "frame # {}: {} ({} regions)",
                        result.frame_number,
                        result.status(),
                        result.regions.len()
                    );
                    results_emitted += 1;
                    if result.occupied {
                        occupied_frames += 1;
                    }
                    sink.frame_result(result)?;
                }
            }
        };

        let frames_processed = self.frame_number - 1;
        log::info!("Number of frames processed: {}", frames_processed);
        Ok(RunSummary {
            frames_read,
            results_emitted,
            occupied_frames,
            background_frame,
            frames_processed,
            termination,
        })
    }
}
