use serde::Serialize;

use crate::frame::Frame;

/// Axis-aligned bounding box of one outer motion contour.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Area of the outer contour polygon.
    pub area: f64,
}

/// Regions sorted by top-left corner (x, then y), for order-independent comparison.
pub fn normalized(mut regions: Vec<Region>) -> Vec<Region> {
    regions.sort_by(|a, b| {
        (a.x, a.y, a.width, a.height)
            .cmp(&(b.x, b.y, b.width, b.height))
            .then(a.area.total_cmp(&b.area))
    });
    regions
}

/// Outcome of one processed frame.
#[derive(Clone, Debug)]
pub struct FrameResult {
    pub frame_number: u64,
    pub occupied: bool,
    pub regions: Vec<Region>,
    pub delta_image: Frame,
    /// Thresholded and dilated mask.
    pub threshold_image: Frame,
    /// Resized input frame with region outlines and the text overlay.
    pub annotated_image: Frame,
}

impl FrameResult {
    pub fn status(&self) -> &'static str {
        if self.occupied {
            "Occupied"
        } else {
            "Unoccupied"
        }
    }
}
