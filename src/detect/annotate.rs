//! The annotated ("security feed") image: region outlines plus a text overlay.
//!
//! The overlay always carries `Frame # N` near the top-right corner; the
//! local timestamp is written bottom-left only when one is supplied.

use anyhow::Result;
use chrono::{DateTime, Local};
use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8};

use crate::detect::result::Region;
use crate::frame::{mat_dimensions, Frame, PixelFormat};

pub const BOX_COLOR: [u8; 3] = [0, 255, 0];
pub const BOX_THICKNESS: i32 = 2;
pub const TEXT_COLOR: [u8; 3] = [255, 0, 0];
pub const TEXT_SCALE: f64 = 0.35;
pub const TIMESTAMP_FORMAT: &str = "%A %d %B %Y %I:%M:%S%p";

/// Text written over the annotated image.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub frame_number: u64,
    pub timestamp: Option<DateTime<Local>>,
}

/// RGB copy of `frame` with a rectangle from `(x, y)` to `(x + w, y + h)`
/// drawn for every region, then the overlay text.
pub fn annotate(frame: &Frame, regions: &[Region], overlay: &Overlay) -> Result<Frame> {
    let mut out = match frame.format() {
        PixelFormat::Rgb24 => frame.to_mat()?,
        PixelFormat::Gray8 => Frame::from_rgb_image(frame.to_rgb_image()).to_mat()?,
    };
    for region in regions {
        let (x, y) = (region.x as i32, region.y as i32);
        imgproc::rectangle_points(
            &mut out,
            Point::new(x, y),
            Point::new(x + region.width as i32, y + region.height as i32),
            color(BOX_COLOR),
            BOX_THICKNESS,
            LINE_8,
            0,
        )?;
    }
    draw_overlay(&mut out, overlay)?;
    Frame::from_mat(&out)
}

fn draw_overlay(image: &mut Mat, overlay: &Overlay) -> Result<()> {
    let (width, height) = mat_dimensions(image);
    if let Some(timestamp) = overlay.timestamp {
        put_text(
            image,
            &timestamp.format(TIMESTAMP_FORMAT).to_string(),
            Point::new(10, height as i32 - 10),
        )?;
    }
    put_text(
        image,
        &format!("Frame # {}", overlay.frame_number),
        Point::new(width as i32 - 90, 20),
    )
}

fn put_text(image: &mut Mat, text: &str, origin: Point) -> Result<()> {
    imgproc::put_text(
        image,
        text,
        origin,
        FONT_HERSHEY_SIMPLEX,
        TEXT_SCALE,
        color(TEXT_COLOR),
        1,
        LINE_8,
        false,
    )?;
    Ok(())
}

fn color([r, g, b]: [u8; 3]) -> Scalar {
    Scalar::new(f64::from(r), f64::from(g), f64::from(b), 0.0)
}
