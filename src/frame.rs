//! Frame containers.
//!
//! - `Frame`: owned 8-bit pixel grid, single-channel (`Gray8`) or RGB (`Rgb24`).
//! - `PixelFormat`: channel layout of a `Frame`.
//!
//! Detection stages work on OpenCV `Mat`s; `to_mat` / `from_mat` copy
//! between the two. RGB frames map to `CV_8UC3` in RGB channel order.
//!
//! A frame is owned by the stage that produced it. Stages read frames they
//! were handed and build new ones for their output; nothing mutates a frame
//! it does not own.

use anyhow::{anyhow, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use opencv::core::{Mat, Scalar, CV_8UC1, CV_8UC3};
use opencv::prelude::*;

use crate::error::ContractViolation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 => 3,
        }
    }

    fn mat_type(self) -> i32 {
        match self {
            PixelFormat::Gray8 => CV_8UC1,
            PixelFormat::Rgb24 => CV_8UC3,
        }
    }
}

/// Owned pixel grid, row-major, interleaved channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Frame {
    /// Wrap a pixel buffer. The buffer length must match the dimensions.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, ContractViolation> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(ContractViolation::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    /// Frame with every channel of every pixel set to `value`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            data: vec![value; len],
            width,
            height,
            format,
        }
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            format: PixelFormat::Rgb24,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn is_gray(&self) -> bool {
        self.format == PixelFormat::Gray8
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Channels of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.format.channels();
        let offset = (y as usize * self.width as usize + x as usize) * c;
        &self.data[offset..offset + c]
    }

    /// Overwrite the channels of every pixel in the rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, value: &[u8]) {
        let c = self.format.channels();
        debug_assert_eq!(value.len(), c);
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for row in y.min(self.height)..y_end {
            for col in x.min(self.width)..x_end {
                let offset = (row as usize * self.width as usize + col as usize) * c;
                self.data[offset..offset + c].copy_from_slice(value);
            }
        }
    }

    /// Number of pixels with at least one non-zero channel.
    pub fn count_nonzero(&self) -> usize {
        self.data
            .chunks_exact(self.format.channels())
            .filter(|px| px.iter().any(|&v| v != 0))
            .count()
    }

    pub(crate) fn ensure_gray(&self) -> Result<(), ContractViolation> {
        if !self.is_gray() {
            return Err(ContractViolation::NotGrayscale);
        }
        Ok(())
    }

    /// Copy into a newly allocated, continuous `Mat`.
    pub fn to_mat(&self) -> Result<Mat> {
        let mut mat = Mat::new_rows_cols_with_default(
            i32::try_from(self.height)?,
            i32::try_from(self.width)?,
            self.format.mat_type(),
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(&self.data);
        Ok(mat)
    }

    /// Copy an 8-bit, one- or three-channel `Mat` into a frame.
    pub fn from_mat(mat: &Mat) -> Result<Self> {
        let format = match mat.typ() {
            t if t == CV_8UC1 => PixelFormat::Gray8,
            t if t == CV_8UC3 => PixelFormat::Rgb24,
            other => return Err(anyhow!("unsupported Mat type {}", other)),
        };
        let (width, height) = mat_dimensions(mat);
        Ok(Self::new(mat.data_bytes()?.to_vec(), width, height, format)?)
    }

    /// RGB copy. Gray frames are replicated across channels.
    pub fn to_rgb_image(&self) -> RgbImage {
        let data = match self.format {
            PixelFormat::Rgb24 => self.data.clone(),
            PixelFormat::Gray8 => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
        };
        // Length is guaranteed by construction.
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Image view for encoding to disk.
    pub fn to_dynamic_image(&self) -> DynamicImage {
        match self.format {
            PixelFormat::Rgb24 => DynamicImage::ImageRgb8(self.to_rgb_image()),
            PixelFormat::Gray8 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .unwrap_or_else(|| GrayImage::new(self.width, self.height)),
            ),
        }
    }
}

/// `(cols, rows)` of a `Mat`.
pub(crate) fn mat_dimensions(mat: &Mat) -> (u32, u32) {
    (mat.cols().max(0) as u32, mat.rows().max(0) as u32)
}
