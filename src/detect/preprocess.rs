//! Frame preprocessing: resize, grayscale, Gaussian blur.
//!
//! Resizing keeps the aspect ratio (`height = floor(h * target / w)`) and
//! uses area interpolation. The blur derives sigma from the kernel size and
//! uses OpenCV's default (reflect-101) border.

use anyhow::Result;
use opencv::core::{Mat, Size};
use opencv::imgproc;
use serde::Serialize;

use crate::error::ConfigError;
use crate::frame::{mat_dimensions, Frame, PixelFormat};

/// Odd, positive blur kernel dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct KernelSize {
    width: u32,
    height: u32,
}

impl KernelSize {
    pub fn new(width: i64, height: i64) -> Result<Self, ConfigError> {
        Ok(Self {
            width: odd_positive("width", width)?,
            height: odd_positive("height", height)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Default for KernelSize {
    fn default() -> Self {
        Self {
            width: 21,
            height: 21,
        }
    }
}

fn odd_positive(axis: &'static str, value: i64) -> Result<u32, ConfigError> {
    if value <= 0 || value % 2 == 0 || value > u32::MAX as i64 {
        return Err(ConfigError::InvalidKernelSize { axis, value });
    }
    Ok(value as u32)
}

/// Non-fatal condition raised while preprocessing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegradedCondition {
    /// The requested width is larger than the source frame; it was upscaled.
    Upscaled { source_width: u32, target_width: u32 },
}

/// Output of [`preprocess`].
#[derive(Clone, Debug)]
pub struct Preprocessed {
    /// Resized frame in its original channel layout (used for annotation).
    pub color: Frame,
    /// Blurred single-channel frame fed to the background model.
    pub gray: Frame,
    pub degraded: Option<DegradedCondition>,
}

/// Resize (when `target_width > 0`), convert to grayscale, then blur.
pub fn preprocess(frame: &Frame, target_width: u32, kernel: KernelSize) -> Result<Preprocessed> {
    let mut degraded = None;
    let source = frame.to_mat()?;
    let color = if target_width > 0 && target_width != frame.width() {
        if frame.width() < target_width {
            degraded = Some(DegradedCondition::Upscaled {
                source_width: frame.width(),
                target_width,
            });
        }
        resize_to_width(&source, target_width)?
    } else {
        source
    };
    let gray = gaussian_blur(&to_gray(&color, frame.format())?, kernel)?;
    Ok(Preprocessed {
        color: Frame::from_mat(&color)?,
        gray: Frame::from_mat(&gray)?,
        degraded,
    })
}

fn resize_to_width(src: &Mat, target_width: u32) -> Result<Mat> {
    let (w, h) = mat_dimensions(src);
    if w == 0 {
        return Ok(src.clone());
    }
    let target_height = ((h as u64 * target_width as u64) / w as u64).max(1);
    let mut dst = Mat::default();
    imgproc::resize(
        src,
        &mut dst,
        Size::new(i32::try_from(target_width)?, i32::try_from(target_height)?),
        0.0,
        0.0,
        imgproc::INTER_AREA,
    )?;
    Ok(dst)
}

fn to_gray(src: &Mat, format: PixelFormat) -> Result<Mat> {
    match format {
        PixelFormat::Gray8 => Ok(src.clone()),
        PixelFormat::Rgb24 => {
            let mut gray = Mat::default();
            imgproc::cvt_color_def(src, &mut gray, imgproc::COLOR_RGB2GRAY)?;
            Ok(gray)
        }
    }
}

fn gaussian_blur(gray: &Mat, kernel: KernelSize) -> Result<Mat> {
    let mut blurred = Mat::default();
    imgproc::gaussian_blur_def(
        gray,
        &mut blurred,
        Size::new(
            i32::try_from(kernel.width())?,
            i32::try_from(kernel.height())?,
        ),
        0.0,
    )?;
    Ok(blurred)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_size_rejects_even_and_non_positive() {
        assert!(KernelSize::new(21, 21).is_ok());
        assert_eq!(
            KernelSize::new(4, 21).unwrap_err(),
            ConfigError::InvalidKernelSize {
                axis: "width",
                value: 4
            }
        );
        assert_eq!(
            KernelSize::new(21, 0).unwrap_err(),
            ConfigError::InvalidKernelSize {
                axis: "height",
                value: 0
            }
        );
        assert!(KernelSize::new(-3, 3).is_err());
    }

    fn blur(gray: &Frame, size: i64) -> Frame {
        let kernel = KernelSize::new(size, size).unwrap();
        Frame::from_mat(&gaussian_blur(&gray.to_mat().unwrap(), kernel).unwrap()).unwrap()
    }

    #[test]
    fn blur_keeps_uniform_frames_unchanged() {
        let gray = Frame::filled(40, 30, PixelFormat::Gray8, 128);
        assert_eq!(blur(&gray, 21), gray);
    }

    #[test]
    fn blur_spreads_a_single_pixel() {
        let mut gray = Frame::filled(5, 5, PixelFormat::Gray8, 0);
        gray.fill_rect(2, 2, 1, 1, &[160]);
        let blurred = blur(&gray, 3);
        // Outer product of [1, 2, 1] / 4 with itself.
        assert_eq!(blurred.pixel(2, 2), &[40]);
        assert_eq!(blurred.pixel(1, 2), &[20]);
        assert_eq!(blurred.pixel(1, 1), &[10]);
        assert_eq!(blurred.pixel(0, 0), &[0]);
    }

    #[test]
    fn gray_conversion_uses_601_weights() {
        let frame = Frame::new(
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
            4,
            1,
            PixelFormat::Rgb24,
        )
        .unwrap();
        let gray = to_gray(&frame.to_mat().unwrap(), frame.format()).unwrap();
        assert_eq!(Frame::from_mat(&gray).unwrap().pixels(), &[76, 150, 29, 255]);
    }

    #[test]
    fn preprocess_resizes_preserving_aspect() {
        let frame = Frame::filled(1000, 750, PixelFormat::Rgb24, 90);
        let out = preprocess(&frame, 500, KernelSize::new(5, 5).unwrap()).unwrap();
        assert_eq!(out.color.dimensions(), (500, 375));
        assert_eq!(out.gray.dimensions(), (500, 375));
        assert!(out.gray.is_gray());
        assert_eq!(out.degraded, None);
    }

    #[test]
    fn downscaling_averages_source_pixels() {
        let mut frame = Frame::filled(8, 4, PixelFormat::Gray8, 0);
        for x in (1..8).step_by(2) {
            frame.fill_rect(x, 0, 1, 4, &[255]);
        }
        let resized = Frame::from_mat(&resize_to_width(&frame.to_mat().unwrap(), 4).unwrap()).unwrap();
        assert_eq!(resized.dimensions(), (4, 2));
        assert!(resized.pixels().iter().all(|&v| (127..=128).contains(&v)));
    }

    #[test]
    fn preprocess_reports_upscaling() {
        let frame = Frame::filled(320, 240, PixelFormat::Rgb24, 90);
        let out = preprocess(&frame, 640, KernelSize::new(3, 3).unwrap()).unwrap();
        assert_eq!(out.color.dimensions(), (640, 480));
        assert_eq!(
            out.degraded,
            Some(DegradedCondition::Upscaled {
                source_width: 320,
                target_width: 640
            })
        );
    }

    #[test]
    fn zero_width_skips_resizing() {
        let frame = Frame::filled(123, 45, PixelFormat::Rgb24, 10);
        let out = preprocess(&frame, 0, KernelSize::new(1, 1).unwrap()).unwrap();
        assert_eq!(out.color, frame);
        assert_eq!(out.gray.pixels(), Frame::filled(123, 45, PixelFormat::Gray8, 10).pixels());
    }
}
