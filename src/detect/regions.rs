//! Outer contours of a binary image.
//!
//! Only outermost contours are kept (`RETR_EXTERNAL`); blobs inside another
//! blob's hole are not reported. A region's area is the area of its contour
//! polygon, which runs through the centres of the boundary pixels: a filled
//! `w x h` rectangle has area `(w - 1) * (h - 1)`.

use anyhow::Result;
use opencv::core::{Mat, Point, Vector};
use opencv::imgproc::{self, CHAIN_APPROX_SIMPLE, RETR_EXTERNAL};

use crate::detect::result::Region;

/// Bounding box and contour area of every outer contour.
pub fn find_external_regions(binary: &Mat) -> Result<Vec<Region>> {
    let mut contours: Vector<Vector<Point>> = Vector::new();
    imgproc::find_contours(
        binary,
        &mut contours,
        RETR_EXTERNAL,
        CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    let mut regions = Vec::with_capacity(contours.len());
    for contour in contours.iter() {
        let area = imgproc::contour_area(&contour, false)?;
        let rect = imgproc::bounding_rect(&contour)?;
        regions.push(Region {
            x: rect.x.max(0) as u32,
            y: rect.y.max(0) as u32,
            width: rect.width.max(0) as u32,
            height: rect.height.max(0) as u32,
            area,
        });
    }
    Ok(regions)
}
