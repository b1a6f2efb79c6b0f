//! Background model: the "no motion" reference that frames are compared against.
//!
//! Two strategies, fixed for the lifetime of a model:
//! - `FirstFrame`: the first accepted frame is stored verbatim and never updated.
//! - `WeightedAverage`: a `CV_64F` running average, updated in place with
//!   `acc = alpha * frame + (1 - alpha) * acc` before every comparison.
//!
//! The accumulator is converted back to 8-bit (absolute value, round half to
//! even, saturate) only to compute a delta.

use anyhow::Result;
use opencv::core::{self, Mat, CV_64F};
use opencv::imgproc;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ContractViolation};
use crate::frame::{mat_dimensions, Frame};

/// Weight of the newest frame in the running average.
pub const RUNNING_AVERAGE_ALPHA: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundStrategy {
    FirstFrame,
    WeightedAverage,
}

impl BackgroundStrategy {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "first_frame" => Ok(BackgroundStrategy::FirstFrame),
            "weighted_average" => Ok(BackgroundStrategy::WeightedAverage),
            other => Err(ConfigError::UnsupportedBackgroundModel(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackgroundStrategy::FirstFrame => "first_frame",
            BackgroundStrategy::WeightedAverage => "weighted_average",
        }
    }
}

/// Floating-point running average of single-channel frames.
#[derive(Clone, Debug)]
pub struct Accumulator {
    mat: Mat,
}

impl Accumulator {
    fn from_gray(gray: &Mat) -> Result<Self> {
        let mut mat = Mat::default();
        gray.convert_to(&mut mat, CV_64F, 1.0, 0.0)?;
        Ok(Self { mat })
    }

    fn accumulate(&mut self, gray: &Mat) -> Result<()> {
        imgproc::accumulate_weighted_def(gray, &mut self.mat, RUNNING_AVERAGE_ALPHA)?;
        Ok(())
    }

    fn to_mat(&self) -> Result<Mat> {
        let mut out = Mat::default();
        core::convert_scale_abs_def(&self.mat, &mut out)?;
        Ok(out)
    }

    /// 8-bit view: `|acc|` rounded half to even, saturated to 255.
    pub fn to_frame(&self) -> Result<Frame> {
        Frame::from_mat(&self.to_mat()?)
    }

    pub fn values(&self) -> Result<&[f64]> {
        Ok(self.mat.data_typed::<f64>()?)
    }
}

#[derive(Clone, Debug)]
enum ModelState {
    Uninitialized,
    FirstFrame(Mat),
    WeightedAverage(Accumulator),
}

/// Background model state machine: `Uninitialized -> Initialized`, never reset.
#[derive(Clone, Debug)]
pub struct BackgroundModel {
    strategy: BackgroundStrategy,
    state: ModelState,
}

impl BackgroundModel {
    pub fn new(strategy: BackgroundStrategy) -> Self {
        Self {
            strategy,
            state: ModelState::Uninitialized,
        }
    }

    pub fn strategy(&self) -> BackgroundStrategy {
        self.strategy
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.state, ModelState::Uninitialized)
    }

    /// Seed the model with the first accepted (preprocessed) frame.
    pub fn initialize(&mut self, frame: &Frame) -> Result<()> {
        frame.ensure_gray()?;
        if self.is_initialized() {
            return Err(ContractViolation::AlreadyInitialized.into());
        }
        log::debug!("starting background model ({})", self.strategy.as_str());
        let gray = frame.to_mat()?;
        self.state = match self.strategy {
            BackgroundStrategy::FirstFrame => ModelState::FirstFrame(gray),
            BackgroundStrategy::WeightedAverage => {
                ModelState::WeightedAverage(Accumulator::from_gray(&gray)?)
            }
        };
        Ok(())
    }

    /// Per-pixel absolute difference between `frame` and the background.
    ///
    /// Under `WeightedAverage` the accumulator absorbs `frame` first.
    pub fn compute_delta(&mut self, frame: &Frame) -> Result<Frame> {
        frame.ensure_gray()?;
        let reference = match &self.state {
            ModelState::Uninitialized => {
                return Err(ContractViolation::BackgroundUninitialized.into())
            }
            ModelState::FirstFrame(reference) => reference,
            ModelState::WeightedAverage(acc) => &acc.mat,
        };
        let expected = mat_dimensions(reference);
        if expected != frame.dimensions() {
            return Err(ContractViolation::mismatch(expected, frame.dimensions()).into());
        }

        let gray = frame.to_mat()?;
        let mut delta = Mat::default();
        match &mut self.state {
            ModelState::WeightedAverage(acc) => {
                acc.accumulate(&gray)?;
                core::absdiff(&gray, &acc.to_mat()?, &mut delta)?;
            }
            ModelState::FirstFrame(reference) => core::absdiff(reference, &gray, &mut delta)?,
            ModelState::Uninitialized => {
                return Err(ContractViolation::BackgroundUninitialized.into())
            }
        }
        Frame::from_mat(&delta)
    }

    /// 8-bit snapshot of the current background, if initialized.
    pub fn background(&self) -> Result<Option<Frame>> {
        match &self.state {
            ModelState::Uninitialized => Ok(None),
            ModelState::FirstFrame(reference) => Ok(Some(Frame::from_mat(reference)?)),
            ModelState::WeightedAverage(acc) => Ok(Some(acc.to_frame()?)),
        }
    }

    pub fn accumulator(&self) -> Option<&Accumulator> {
        match &self.state {
            ModelState::WeightedAverage(acc) => Some(acc),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn gray(value: u8) -> Frame {
        Frame::filled(8, 6, PixelFormat::Gray8, value)
    }

    #[test]
    fn parses_supported_models() {
        assert_eq!(
            BackgroundStrategy::parse("first_frame").unwrap(),
            BackgroundStrategy::FirstFrame
        );
        assert_eq!(
            BackgroundStrategy::parse("weighted_average").unwrap(),
            BackgroundStrategy::WeightedAverage
        );
        assert_eq!(
            BackgroundStrategy::parse("mog2").unwrap_err(),
            ConfigError::UnsupportedBackgroundModel("mog2".to_string())
        );
    }

    fn violation(err: anyhow::Error) -> ContractViolation {
        err.downcast::<ContractViolation>().expect("contract violation")
    }

    #[test]
    fn delta_before_initialize_is_a_contract_violation() {
        let mut model = BackgroundModel::new(BackgroundStrategy::FirstFrame);
        assert_eq!(
            violation(model.compute_delta(&gray(10)).unwrap_err()),
            ContractViolation::BackgroundUninitialized
        );
    }

    #[test]
    fn second_initialize_is_rejected() {
        let mut model = BackgroundModel::new(BackgroundStrategy::WeightedAverage);
        model.initialize(&gray(10)).unwrap();
        assert_eq!(
            violation(model.initialize(&gray(20)).unwrap_err()),
            ContractViolation::AlreadyInitialized
        );
    }

    #[test]
    fn first_frame_delta_of_background_is_zero() {
        for seed in [0u8, 37, 255] {
            let mut frame = gray(seed);
            frame.fill_rect(1, 1, 3, 2, &[seed.wrapping_add(90)]);
            let mut model = BackgroundModel::new(BackgroundStrategy::FirstFrame);
            model.initialize(&frame).unwrap();
            let delta = model.compute_delta(&frame).unwrap();
            assert_eq!(delta.count_nonzero(), 0);
        }
    }

    #[test]
    fn first_frame_reference_is_never_updated() {
        let mut model = BackgroundModel::new(BackgroundStrategy::FirstFrame);
        model.initialize(&gray(100)).unwrap();
        for _ in 0..5 {
            let delta = model.compute_delta(&gray(160)).unwrap();
            assert!(delta.pixels().iter().all(|&v| v == 60));
        }
        assert_eq!(model.background().unwrap(), Some(gray(100)));
    }

    #[test]
    fn weighted_average_updates_before_comparing() {
        let mut model = BackgroundModel::new(BackgroundStrategy::WeightedAverage);
        model.initialize(&gray(0)).unwrap();

        let d1 = model.compute_delta(&gray(100)).unwrap();
        assert!(d1.pixels().iter().all(|&v| v == 50));
        let acc = model.accumulator().unwrap();
        assert!(acc.values().unwrap().iter().all(|&v| v == 50.0));
        assert_eq!(acc.to_frame().unwrap(), gray(50));

        let d2 = model.compute_delta(&gray(100)).unwrap();
        assert!(d2.pixels().iter().all(|&v| v == 25));
    }

    #[test]
    fn weighted_average_converges_on_static_scene() {
        let mut model = BackgroundModel::new(BackgroundStrategy::WeightedAverage);
        model.initialize(&gray(0)).unwrap();
        let mut last = u8::MAX;
        for _ in 0..12 {
            let delta = model.compute_delta(&gray(200)).unwrap();
            let max = *delta.pixels().iter().max().unwrap();
            assert!(max <= last);
            last = max;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn accumulator_rounds_half_to_even() {
        let mut model = BackgroundModel::new(BackgroundStrategy::WeightedAverage);
        model.initialize(&gray(0)).unwrap();
        // acc = 0.5 rounds to 0
        let delta = model.compute_delta(&gray(1)).unwrap();
        assert_eq!(delta.pixels()[0], 1);

        let mut model = BackgroundModel::new(BackgroundStrategy::WeightedAverage);
        model.initialize(&gray(0)).unwrap();
        // acc = 1.5 rounds to 2
        let delta = model.compute_delta(&gray(3)).unwrap();
        assert_eq!(delta.pixels()[0], 1);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        for strategy in [
            BackgroundStrategy::FirstFrame,
            BackgroundStrategy::WeightedAverage,
        ] {
            let mut model = BackgroundModel::new(strategy);
            model.initialize(&gray(0)).unwrap();
            let other = Frame::filled(4, 4, PixelFormat::Gray8, 0);
            assert!(matches!(
                violation(model.compute_delta(&other).unwrap_err()),
                ContractViolation::DimensionMismatch { .. }
            ));
        }
    }

    #[test]
    fn color_frames_are_rejected() {
        let mut model = BackgroundModel::new(BackgroundStrategy::FirstFrame);
        let color = Frame::filled(8, 6, PixelFormat::Rgb24, 0);
        assert_eq!(
            violation(model.initialize(&color).unwrap_err()),
            ContractViolation::NotGrayscale
        );
    }
}
