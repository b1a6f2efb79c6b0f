use anyhow::{anyhow, Result};
use image::DynamicImage;

use crate::frame::{Frame, PixelFormat};

/// Decoded image of any color type as an RGB frame.
pub(crate) fn decoded_to_frame(image: DynamicImage) -> Frame {
    Frame::from_rgb_image(image.into_rgb8())
}

/// Packed RGB24 buffer as a frame, validating its length.
pub(crate) fn rgb24_frame(pixels: Vec<u8>, width: u32, height: u32) -> Result<Frame> {
    let expected = width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
    if pixels.len() != expected {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    Ok(Frame::new(pixels, width, height, PixelFormat::Rgb24)?)
}
