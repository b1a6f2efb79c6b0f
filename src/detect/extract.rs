//! Motion extraction: threshold, dilate, find regions, filter by area.

use anyhow::Result;
use opencv::core::{Mat, Point, BORDER_CONSTANT};
use opencv::imgproc::{self, THRESH_BINARY};

use crate::detect::regions::find_external_regions;
use crate::detect::result::Region;
use crate::frame::Frame;

/// Foreground value of binary images.
pub const FOREGROUND: u8 = 255;

/// 3x3 dilation passes applied after thresholding. Fixed, not configurable.
pub const DILATE_ITERATIONS: i32 = 2;

/// Output of [`extract`].
#[derive(Clone, Debug)]
pub struct Extraction {
    pub occupied: bool,
    pub regions: Vec<Region>,
    /// Thresholded and dilated image the regions were found on.
    pub binary: Frame,
}

/// Classify a delta image.
///
/// Pixels brighter than `threshold` become foreground, the mask is dilated,
/// and every outer contour whose area is at least `min_area` is reported by
/// its bounding box.
pub fn extract(delta: &Frame, threshold: u8, min_area: u64) -> Result<Extraction> {
    delta.ensure_gray()?;
    let binary = dilate(&threshold_binary(&delta.to_mat()?, threshold)?, DILATE_ITERATIONS)?;
    let min_area = min_area as f64;
    let regions: Vec<Region> = find_external_regions(&binary)?
        .into_iter()
        .filter(|region| region.area >= min_area)
        .collect();
    Ok(Extraction {
        occupied: !regions.is_empty(),
        regions,
        binary: Frame::from_mat(&binary)?,
    })
}

/// `v > threshold ? 255 : 0` per pixel.
fn threshold_binary(delta: &Mat, threshold: u8) -> Result<Mat> {
    let mut binary = Mat::default();
    imgproc::threshold(
        delta,
        &mut binary,
        f64::from(threshold),
        f64::from(FOREGROUND),
        THRESH_BINARY,
    )?;
    Ok(binary)
}

/// Dilation with the default 3x3 square, applied `iterations` times.
/// Pixels outside the image never contribute.
fn dilate(binary: &Mat, iterations: i32) -> Result<Mat> {
    let mut dilated = Mat::default();
    imgproc::dilate(
        binary,
        &mut dilated,
        &Mat::default(),
        Point::new(-1, -1),
        iterations,
        BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    Ok(dilated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn delta_with_blob(x: u32, y: u32, w: u32, h: u32, value: u8) -> Frame {
        let mut frame = Frame::filled(60, 40, PixelFormat::Gray8, 0);
        frame.fill_rect(x, y, w, h, &[value]);
        frame
    }

    fn thresholded(frame: &Frame, threshold: u8) -> Frame {
        Frame::from_mat(&threshold_binary(&frame.to_mat().unwrap(), threshold).unwrap()).unwrap()
    }

    fn dilated(frame: &Frame, iterations: i32) -> Frame {
        Frame::from_mat(&dilate(&frame.to_mat().unwrap(), iterations).unwrap()).unwrap()
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let frame = Frame::new(vec![24, 25, 26, 255], 4, 1, PixelFormat::Gray8).unwrap();
        assert_eq!(thresholded(&frame, 25).pixels(), &[0, 0, 255, 255]);
    }

    #[test]
    fn raising_threshold_never_adds_foreground() {
        let mut frame = Frame::filled(16, 16, PixelFormat::Gray8, 0);
        for (i, px) in frame.pixels_mut().iter_mut().enumerate() {
            *px = (i * 7 % 256) as u8;
        }
        let mut last = usize::MAX;
        for t in (0..255u16).step_by(5) {
            let count = thresholded(&frame, t as u8).count_nonzero();
            assert!(count <= last, "threshold {} grew foreground", t);
            last = count;
        }
    }

    #[test]
    fn dilation_grows_a_pixel_to_five_by_five() {
        let mut frame = Frame::filled(9, 9, PixelFormat::Gray8, 0);
        frame.fill_rect(4, 4, 1, 1, &[FOREGROUND]);
        let out = dilated(&frame, DILATE_ITERATIONS);
        assert_eq!(out.count_nonzero(), 25);
        assert_eq!(out.pixel(2, 2), &[FOREGROUND]);
        assert_eq!(out.pixel(6, 6), &[FOREGROUND]);
        assert_eq!(out.pixel(1, 4), &[0]);
    }

    #[test]
    fn dilation_clips_at_the_border() {
        let mut frame = Frame::filled(5, 5, PixelFormat::Gray8, 0);
        frame.fill_rect(0, 0, 1, 1, &[FOREGROUND]);
        assert_eq!(dilated(&frame, DILATE_ITERATIONS).count_nonzero(), 9);
    }

    #[test]
    fn dilation_merges_nearby_fragments() {
        let mut delta = Frame::filled(40, 20, PixelFormat::Gray8, 0);
        delta.fill_rect(5, 5, 6, 6, &[200]);
        delta.fill_rect(14, 5, 6, 6, &[200]);
        let out = extract(&delta, 25, 0).unwrap();
        assert_eq!(out.regions.len(), 1);
        assert_eq!((out.regions[0].x, out.regions[0].width), (3, 19));
    }

    #[test]
    fn reports_dilated_bounding_box_and_contour_area() {
        let delta = delta_with_blob(10, 10, 8, 6, 120);
        let out = extract(&delta, 25, 0).unwrap();
        assert!(out.occupied);
        assert_eq!(out.regions.len(), 1);
        let r = out.regions[0];
        assert_eq!((r.x, r.y, r.width, r.height), (8, 8, 12, 10));
        assert_eq!(r.area, 11.0 * 9.0);
        assert_eq!(out.binary.count_nonzero(), 12 * 10);
    }

    #[test]
    fn area_filter_keeps_regions_at_the_limit() {
        let delta = delta_with_blob(10, 10, 8, 6, 120);
        assert!(extract(&delta, 25, 99).unwrap().occupied);
        assert!(!extract(&delta, 25, 100).unwrap().occupied);
    }

    #[test]
    fn faint_changes_are_unoccupied() {
        let delta = delta_with_blob(10, 10, 8, 6, 20);
        let out = extract(&delta, 25, 0).unwrap();
        assert!(!out.occupied);
        assert!(out.regions.is_empty());
        assert_eq!(out.binary.count_nonzero(), 0);
    }

    #[test]
    fn color_deltas_are_rejected() {
        let delta = Frame::filled(4, 4, PixelFormat::Rgb24, 0);
        let err = extract(&delta, 25, 0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<crate::error::ContractViolation>(),
            Some(&crate::error::ContractViolation::NotGrayscale)
        );
    }

    #[test]
    fn larger_min_area_reports_a_subset() {
        let mut delta = Frame::filled(80, 60, PixelFormat::Gray8, 0);
        delta.fill_rect(2, 2, 3, 3, &[255]);
        delta.fill_rect(20, 20, 10, 4, &[255]);
        delta.fill_rect(50, 30, 20, 20, &[255]);
        let mut previous = extract(&delta, 25, 0).unwrap().regions;
        assert_eq!(previous.len(), 3);
        for min_area in [10, 49, 100, 300, 600, 10_000] {
            let regions = extract(&delta, 25, min_area).unwrap().regions;
            assert!(regions.iter().all(|r| previous.contains(r)));
            previous = regions;
        }
        assert!(previous.is_empty());
    }
}
